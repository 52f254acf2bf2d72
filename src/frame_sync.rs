// Frame synchronization - per-slot acquire semaphores and frame fences
//
// One "target available" semaphore and one CPU fence per buffer slot. The
// fence bounds how far the host can run ahead of the device: a slot is only
// reused after the fence from its previous frame has signaled.

use crate::device::Device;
use anyhow::{Context, Result};
use std::sync::Arc;

pub struct FrameSync<D: Device> {
    device: Arc<D>,
    image_available: Vec<D::Semaphore>,
    in_flight: Vec<D::Fence>,
}

impl<D: Device> FrameSync<D> {
    pub fn new(device: &Arc<D>, slot_count: usize) -> Result<Self> {
        let mut sync = Self {
            device: Arc::clone(device),
            image_available: Vec::with_capacity(slot_count),
            in_flight: Vec::with_capacity(slot_count),
        };
        // Partially created objects are released by Drop on early return.
        for slot in 0..slot_count {
            let semaphore = device
                .create_semaphore()
                .with_context(|| format!("Failed to create acquire semaphore for slot {slot}"))?;
            sync.image_available.push(semaphore);
            // Start signaled so the first use of each slot does not block.
            let fence = device
                .create_fence(true)
                .with_context(|| format!("Failed to create frame fence for slot {slot}"))?;
            sync.in_flight.push(fence);
        }
        Ok(sync)
    }

    pub fn slot_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn image_available(&self, slot: usize) -> D::Semaphore {
        self.image_available[slot]
    }

    pub fn image_available_all(&self) -> &[D::Semaphore] {
        &self.image_available
    }

    pub fn in_flight_fence(&self, slot: usize) -> D::Fence {
        self.in_flight[slot]
    }

    pub fn in_flight_fences(&self) -> &[D::Fence] {
        &self.in_flight
    }
}

impl<D: Device> Drop for FrameSync<D> {
    fn drop(&mut self) {
        for semaphore in self.image_available.drain(..) {
            self.device.destroy_semaphore(semaphore);
        }
        for fence in self.in_flight.drain(..) {
            self.device.destroy_fence(fence);
        }
    }
}
