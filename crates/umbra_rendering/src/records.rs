//! # GPU Records
//!
//! Fixed-layout records read directly by the device-side cull and draw
//! passes. Field order and padding are part of the device contract.

use bytemuck::{Pod, Zeroable};
use umbra_shared::constants::{
    ATLAS_PACK_H_SHIFT, ATLAS_PACK_W_SHIFT, ATLAS_PACK_X_SHIFT, ATLAS_PACK_Y_SHIFT,
};
use umbra_shared::math::Placement;

/// One drawable scene entity.
///
/// The trailing draw fields form an indexed indirect draw command. An entity
/// whose `index_count` is zero is a zombie the broadphase cull skips.
///
/// Size: 96 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RenderEntity {
    /// Device address of the material's uniform array. Filled by the cull.
    pub material_uniforms_address: u64,
    /// Device address of the mesh attribute data.
    pub mesh_address: u64,
    /// Device address of the vertex position stream.
    pub position_stream_address: u64,
    _pad0: u64,
    /// World position.
    pub position: [f32; 3],
    /// Bounding sphere radius around `position`.
    pub bounding_radius: f32,
    /// Rotation quaternion (xyzw).
    pub rotation: [f32; 4],
    /// Material set this entity draws with.
    pub material_id: u32,
    /// Index into the material's uniform array.
    pub material_uniform_index: u32,
    /// Indices to draw. Zero marks a zombie.
    pub index_count: u32,
    /// Instances to draw.
    pub instance_count: u32,
    /// Added to each index before fetching vertices.
    pub vertex_offset: i32,
    /// First instance id.
    pub first_instance: u32,
    _pad1: [u32; 2],
}

impl RenderEntity {
    /// Creates a single-instance entity.
    #[must_use]
    pub fn new(mesh: MeshRef, placement: Placement, material_id: u32, material_uniform_index: u32) -> Self {
        Self {
            material_uniforms_address: 0,
            mesh_address: mesh.attribute_address,
            position_stream_address: mesh.position_address,
            _pad0: 0,
            position: placement.position.to_f32_array(),
            bounding_radius: mesh.bounding_radius,
            rotation: placement.rotation.to_f32_array(),
            material_id,
            material_uniform_index,
            index_count: mesh.index_count,
            instance_count: 1,
            vertex_offset: 0,
            first_instance: 0,
            _pad1: [0; 2],
        }
    }

    /// Moves the entity.
    pub fn set_placement(&mut self, placement: Placement) {
        self.position = placement.position.to_f32_array();
        self.rotation = placement.rotation.to_f32_array();
    }

    /// Whether the entity has been retired.
    #[must_use]
    pub fn is_zombie(&self) -> bool {
        self.index_count == 0
    }
}

/// Opaque device references describing a loaded mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeshRef {
    /// Device address of the attribute data.
    pub attribute_address: u64,
    /// Device address of the position stream.
    pub position_address: u64,
    /// Number of indices.
    pub index_count: u32,
    /// Bounding sphere radius.
    pub bounding_radius: f32,
}

/// Placement of a light's shadow tile in the atlas, in blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AtlasRect {
    /// Left edge.
    pub x: u8,
    /// Top edge.
    pub y: u8,
    /// Width.
    pub w: u8,
    /// Height.
    pub h: u8,
}

impl AtlasRect {
    /// Packs the rect into one word: byte 0 is x, byte 3 is h.
    #[must_use]
    pub fn pack(self) -> u32 {
        u32::from(self.x) << ATLAS_PACK_X_SHIFT
            | u32::from(self.y) << ATLAS_PACK_Y_SHIFT
            | u32::from(self.w) << ATLAS_PACK_W_SHIFT
            | u32::from(self.h) << ATLAS_PACK_H_SHIFT
    }

    /// Inverse of [`AtlasRect::pack`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn unpack(packed: u32) -> Self {
        Self {
            x: (packed >> ATLAS_PACK_X_SHIFT) as u8,
            y: (packed >> ATLAS_PACK_Y_SHIFT) as u8,
            w: (packed >> ATLAS_PACK_W_SHIFT) as u8,
            h: (packed >> ATLAS_PACK_H_SHIFT) as u8,
        }
    }
}

/// Shadow-casting light as the lighting passes see it.
///
/// Size: 128 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightDef {
    /// World to light clip space.
    pub view_proj: [[f32; 4]; 4],
    /// World position (xyz) and light depth (w).
    pub world_pos_depth: [f32; 4],
    /// Direction quaternion (xyzw).
    pub dir_quat: [f32; 4],
    /// Unnormalized color.
    pub color: [f32; 3],
    /// Shadow tile placement, see [`AtlasRect::pack`].
    pub atlas_packed: u32,
    /// Falloff inner and outer half angles in radians.
    pub cone_angles: [f32; 2],
    _pad: [f32; 2],
}

impl LightDef {
    /// Shadow tile placement.
    #[must_use]
    pub fn atlas_rect(&self) -> AtlasRect {
        AtlasRect::unpack(self.atlas_packed)
    }

    /// Tile as `[x, y, w, h]` fractions of an atlas of `atlas_blocks`.
    #[must_use]
    pub fn atlas_rect_normalized(&self, atlas_blocks: [u32; 2]) -> [f32; 4] {
        let rect = self.atlas_rect();
        #[allow(clippy::cast_precision_loss)]
        let (bw, bh) = (atlas_blocks[0] as f32, atlas_blocks[1] as f32);
        [
            f32::from(rect.x) / bw,
            f32::from(rect.y) / bh,
            f32::from(rect.w) / bw,
            f32::from(rect.h) / bh,
        ]
    }
}

/// Assembles a light record.
pub(crate) fn light_def(
    view_proj: [[f32; 4]; 4],
    world_pos_depth: [f32; 4],
    dir_quat: [f32; 4],
    color: [f32; 3],
    cone_angles: [f32; 2],
    rect: AtlasRect,
) -> LightDef {
    LightDef {
        view_proj,
        world_pos_depth,
        dir_quat,
        color,
        atlas_packed: rect.pack(),
        cone_angles,
        _pad: [0.0; 2],
    }
}
