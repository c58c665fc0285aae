//! # wgpu Device
//!
//! Copies accumulate in one command encoder per submission. Fences are
//! `on_submitted_work_done` callbacks polled until they fire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use super::{CopyRegion, Fences, GpuDevice, SubmissionIndex};
use crate::error::DeviceError;

struct Submissions {
    next: u64,
    done: HashMap<u64, Arc<AtomicBool>>,
}

/// [`GpuDevice`] over a `wgpu` device and queue.
pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    encoder: Mutex<Option<wgpu::CommandEncoder>>,
    submissions: Mutex<Submissions>,
}

impl WgpuDevice {
    /// Wraps an initialized device and its queue.
    #[must_use]
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            encoder: Mutex::new(None),
            submissions: Mutex::new(Submissions {
                next: 0,
                done: HashMap::new(),
            }),
        }
    }

    /// The wrapped device.
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// The wrapped queue.
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl Fences for WgpuDevice {
    fn wait(&self, submission: SubmissionIndex, timeout: Duration) -> Result<(), DeviceError> {
        let flag = {
            let submissions = self.submissions.lock();
            if submission.0 > submissions.next {
                return Err(DeviceError::UnknownSubmission(submission));
            }
            match submissions.done.get(&submission.0) {
                Some(flag) => Arc::clone(flag),
                // Already observed complete and forgotten.
                None => return Ok(()),
            }
        };

        let start = Instant::now();
        while !flag.load(Ordering::Acquire) {
            if start.elapsed() >= timeout {
                return Err(DeviceError::Timeout {
                    submission,
                    timeout,
                });
            }
            let _ = self.device.poll(wgpu::Maintain::Poll);
            std::thread::yield_now();
        }

        // Completion is in order, so everything up to here is done too.
        self.submissions
            .lock()
            .done
            .retain(|&index, _| index > submission.0);
        Ok(())
    }
}

impl GpuDevice for WgpuDevice {
    type Buffer = wgpu::Buffer;

    fn create_buffer(&self, label: &str, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    fn create_staging_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::COPY_SRC,
            })
    }

    fn buffer_size(&self, buffer: &wgpu::Buffer) -> u64 {
        buffer.size()
    }

    fn copy_buffer_regions(&self, src: &wgpu::Buffer, dst: &wgpu::Buffer, regions: &[CopyRegion]) {
        if regions.is_empty() {
            return;
        }
        let mut encoder = self.encoder.lock();
        let encoder = encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("umbra mirror uploads"),
                })
        });
        for region in regions {
            encoder.copy_buffer_to_buffer(src, region.src_offset, dst, region.dst_offset, region.size);
        }
    }

    fn submit(&self) -> SubmissionIndex {
        let commands = self.encoder.lock().take().map(wgpu::CommandEncoder::finish);
        self.queue.submit(commands);

        let flag = Arc::new(AtomicBool::new(false));
        let signal = Arc::clone(&flag);
        self.queue.on_submitted_work_done(move || {
            signal.store(true, Ordering::Release);
        });

        let mut submissions = self.submissions.lock();
        submissions.next += 1;
        let index = submissions.next;
        submissions.done.insert(index, flag);
        SubmissionIndex(index)
    }
}
