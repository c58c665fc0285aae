//! # Render Scene
//!
//! Owns the scene's mirrored containers and drives them through a frame:
//!
//! ```text
//! begin_frame ──► mutate entities/lights ──► prepare_frame ──► draw ──► end_frame
//!   (acquire)                                (filter lights,           (submit)
//!                                             flush mirrors)
//! ```

use umbra_core::{
    FlushStats, FrameRing, GpuDevice, MirrorVec, SlotArena, SlotHandle, StableId, StableList,
    SubmissionIndex, SyncError,
};
use umbra_shared::math::{Mat4, Placement};

use crate::config::{ConfigError, RendererConfig};
use crate::culling::Cone;
use crate::lighting::{filter_lights, AtlasExtent, FilterReport, ShadowSettings, Spotlight};
use crate::records::{LightDef, RenderEntity};

/// Stable handle to a scene entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityId(StableId);

impl EntityId {
    /// Slot in the device entity buffer.
    #[must_use]
    pub fn index(self) -> usize {
        self.0.index()
    }
}

/// Handle to a scene light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LightId(SlotHandle);

/// What [`RenderScene::prepare_frame`] did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameSummary {
    /// Generation the frame recorded into.
    pub generation: usize,
    /// Light filtering outcome.
    pub lights: FilterReport,
    /// Entity buffer upload.
    pub entities: FlushStats,
    /// Light buffer upload.
    pub light_defs: FlushStats,
}

/// Scene state mirrored onto a device.
pub struct RenderScene<D: GpuDevice> {
    device: D,
    config: RendererConfig,
    atlas: AtlasExtent,
    settings: ShadowSettings,
    ring: FrameRing,
    entities: StableList<RenderEntity, D>,
    lights: SlotArena<Spotlight>,
    light_defs: MirrorVec<LightDef, D>,
    scratch: Vec<LightDef>,
}

impl<D: GpuDevice> RenderScene<D> {
    /// Creates an empty scene on `device`.
    ///
    /// # Errors
    ///
    /// Returns the first constraint `config` violates.
    pub fn new(device: D, config: RendererConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let atlas = config.atlas_extent()?;
        let capacity = config.min_mirror_capacity;
        let entities = StableList::with_capacity(&device, "render entities", capacity);
        let light_defs = MirrorVec::with_capacity(&device, "shadow lights", capacity);

        Ok(Self {
            ring: FrameRing::new(config.frames_in_flight, config.drain_timeout()),
            settings: config.shadow_settings(),
            atlas,
            entities,
            lights: SlotArena::new(),
            light_defs,
            scratch: Vec::new(),
            device,
            config,
        })
    }

    /// The device.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The configuration the scene was built with.
    #[must_use]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Shadow atlas size in blocks.
    #[must_use]
    pub fn atlas(&self) -> AtlasExtent {
        self.atlas
    }

    /// The frame ring.
    #[must_use]
    pub fn ring(&self) -> &FrameRing {
        &self.ring
    }

    // -------------------------------------------------------------------------
    // Entities
    // -------------------------------------------------------------------------

    /// Adds an entity.
    pub fn add_entity(&mut self, entity: RenderEntity) -> EntityId {
        EntityId(self.entities.add(entity))
    }

    /// Retires an entity and returns its last record, so the caller can
    /// release the material uniform it referenced.
    ///
    /// The slot stays in the device buffer as a zombie (zero index count)
    /// until reused.
    ///
    /// # Panics
    ///
    /// Panics if `id` was already removed.
    pub fn remove_entity(&mut self, id: EntityId) -> RenderEntity {
        let record = self.entities.get_mut(id.0);
        let removed = *record;
        record.index_count = 0;
        self.entities.remove(id.0);
        removed
    }

    /// Entity record.
    ///
    /// # Panics
    ///
    /// Panics if `id` was removed.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> &RenderEntity {
        self.entities.get(id.0)
    }

    /// Mutable entity record; queued for upload.
    ///
    /// # Panics
    ///
    /// Panics if `id` was removed.
    pub fn entity_mut(&mut self, id: EntityId) -> &mut RenderEntity {
        self.entities.get_mut(id.0)
    }

    /// Moves an entity.
    ///
    /// # Panics
    ///
    /// Panics if `id` was removed.
    pub fn set_entity_placement(&mut self, id: EntityId, placement: Placement) {
        self.entities.get_mut(id.0).set_placement(placement);
    }

    /// Whether `id` names a live entity.
    #[must_use]
    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.entities.contains(id.0)
    }

    /// Live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.live_count()
    }

    /// Device buffer of entity records, zombies included.
    #[must_use]
    pub fn entity_buffer(&self) -> &D::Buffer {
        self.entities.device_buffer()
    }

    // -------------------------------------------------------------------------
    // Lights
    // -------------------------------------------------------------------------

    /// Adds a light.
    pub fn add_light(&mut self, light: Spotlight) -> LightId {
        LightId(self.lights.insert(light))
    }

    /// Removes a light, or returns `None` if it was already removed.
    pub fn remove_light(&mut self, id: LightId) -> Option<Spotlight> {
        self.lights.remove(id.0)
    }

    /// Light for `id`.
    #[must_use]
    pub fn light(&self, id: LightId) -> Option<&Spotlight> {
        self.lights.get(id.0)
    }

    /// Mutable light for `id`.
    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Spotlight> {
        self.lights.get_mut(id.0)
    }

    /// Moves a light. Returns false if `id` was removed.
    pub fn set_light_placement(&mut self, id: LightId, placement: Placement) -> bool {
        match self.lights.get_mut(id.0) {
            Some(light) => {
                light.set_placement(placement);
                true
            }
            None => false,
        }
    }

    /// Number of lights.
    #[must_use]
    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    /// Lights chosen by the last [`Self::prepare_frame`].
    #[must_use]
    pub fn light_defs(&self) -> &[LightDef] {
        self.light_defs.as_slice()
    }

    /// Device buffer of shadowed lights.
    #[must_use]
    pub fn light_buffer(&self) -> &D::Buffer {
        self.light_defs.device_buffer()
    }

    // -------------------------------------------------------------------------
    // Frame
    // -------------------------------------------------------------------------

    /// Starts a frame. Returns the generation index.
    ///
    /// # Panics
    ///
    /// Panics if the generation does not drain in time, or a frame is
    /// already open.
    pub fn begin_frame(&mut self) -> usize {
        self.ring.acquire_next(&self.device).index()
    }

    /// Starts a frame, reporting a drain timeout instead of panicking.
    ///
    /// # Errors
    ///
    /// [`SyncError::DrainTimeout`]; the frame is not started.
    pub fn try_begin_frame(&mut self) -> Result<usize, SyncError> {
        Ok(self.ring.try_acquire_next(&self.device)?.index())
    }

    /// Chooses this frame's shadowed lights and uploads everything that
    /// changed.
    ///
    /// # Panics
    ///
    /// Panics if no frame is open.
    pub fn prepare_frame(&mut self, viewer: &Cone, camera_view_proj: &Mat4) -> FrameSummary {
        let lights = filter_lights(
            &mut self.scratch,
            self.lights.iter().map(|(_, light)| light),
            viewer,
            camera_view_proj,
            self.atlas,
            &self.settings,
        );
        self.light_defs.sync_from_slice(&self.scratch);

        let generation = self.ring.recording();
        let entities = self.entities.flush(&self.device, generation);
        let light_defs = self.light_defs.flush(&self.device, generation);

        FrameSummary {
            generation: generation.index(),
            lights,
            entities,
            light_defs,
        }
    }

    /// Submits the frame's recorded work.
    ///
    /// # Panics
    ///
    /// Panics if no frame is open.
    pub fn end_frame(&mut self) -> SubmissionIndex {
        let submission = self.device.submit();
        self.ring.submit(submission);
        submission
    }

    /// Runs `release` once the open frame's work has completed on the device.
    ///
    /// # Panics
    ///
    /// Panics if no frame is open.
    pub fn defer_release(&mut self, release: impl FnOnce() + Send + 'static) {
        self.ring.defer_release(release);
    }

    /// Waits for all submitted work and releases every parked resource.
    ///
    /// # Errors
    ///
    /// [`SyncError::DrainTimeout`] if the device never finishes.
    pub fn shutdown(&mut self) -> Result<(), SyncError> {
        self.ring.drain_all(&self.device)
    }
}
