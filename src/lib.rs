// =============================================================================
// THREADED RENDERER - multi-threaded GPU render-job scheduler
// =============================================================================
//
// Render passes record their command buffers on a pool of worker threads and
// submit them to their own GPU queues. Ordering between passes is carried by
// a pair of primitives per dependency edge and buffer slot:
//
//   producer ──submit──► binary semaphore ──► consumer's submission (GPU)
//            └─signal──► host semaphore ────► consumer's submit call (CPU)
//
// The device semaphore orders execution on the GPU, the host semaphore makes
// sure the consumer is never submitted before its producer, which binary
// semaphores require.
//
// LAYOUT:
//   device     - the GPU seam every scheduler type is generic over
//   scheduler  - host semaphores, jobs, worker pool, pass graph
//   renderer   - per-frame driver (acquire, update, dispatch, present)
//   backend    - Vulkan implementation of the device and presenter
//   headless   - software device for tests and GPU-less runs
//   passes     - the deferred frame graph and its Vulkan recorders
//
// =============================================================================

pub mod backend;
pub mod config;
pub mod config_watch;
pub mod device;
pub mod frame_sync;
pub mod headless;
pub mod passes;
pub mod renderer;
pub mod scene;
pub mod scheduler;
