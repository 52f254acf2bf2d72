// =============================================================================
// THREADED RENDERER - multi-threaded render-job scheduler on Vulkan
// =============================================================================
//
// Five deferred passes are recorded in parallel on a pool of render workers,
// each submitting to its own GPU queue. The frame graph decides who waits on
// whom; this binary only owns the window, the config and the frame loop.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit App (window, input, config hot reload)                   │
// │    └── Renderer (control thread: acquire, update, dispatch)     │
// │          ├── FrameGraph (passes, per-edge semaphore pairs)      │
// │          ├── RenderThreadPool (workers: record + submit)        │
// │          └── VulkanPresenter (swapchain on the present queue)   │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Wait for the slot's frame fence, acquire a swapchain image
// 2. Update the scene's uniforms for the slot
// 3. Hand every pass's job to the worker pool
// 4. Present once the terminal pass has been submitted
//
// With `[headless] enabled = true` the same scheduler runs against a
// software device instead, without a window or GPU.
//
// =============================================================================

use anyhow::{Context, Result};
use ash::vk;
use parking_lot::RwLock;
use raw_window_handle::HasDisplayHandle;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use threaded_renderer::backend::{RenderTargets, Surface, VulkanDevice, VulkanPresenter};
use threaded_renderer::config::{Config, DEFAULT_CONFIG_PATH};
use threaded_renderer::config_watch::ConfigWatcher;
use threaded_renderer::frame_sync::FrameSync;
use threaded_renderer::headless::{HeadlessDevice, HeadlessPresenter, SimulatedPass};
use threaded_renderer::passes::{deferred_graph, DeferredPasses, PassContext};
use threaded_renderer::renderer::{FrameStatus, Renderer};
use threaded_renderer::scene::{DemoScene, InputState, SceneState};
use threaded_renderer::scheduler::RenderThreadPool;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    // Initialize logging
    init_logging(&config)?;
    log::info!("Starting threaded renderer");
    log::info!(
        "Slots: {}, workers: {}, command buffers per worker: {}",
        config.graphics.max_frames_in_flight,
        match config.renderer.worker_threads {
            0 => "auto".to_string(),
            n => n.to_string(),
        },
        config.renderer.command_buffers_per_worker
    );

    if config.headless.enabled {
        return run_headless(&config);
    }

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Initialize logging, optionally piped into the configured log file
fn init_logging(config: &Config) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(config.log_level());

    if config.debug.log_to_file {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
            .with_context(|| format!("Failed to open log file {}", config.debug.log_file))?;
        writeln!(file, "=== Threaded Renderer Log ===")?;
        writeln!(file, "Started: {:?}", std::time::SystemTime::now())?;
        writeln!(file)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

/// Workers to spawn: the configured count, or `available` when set to 0.
fn worker_count(configured: usize, available: usize) -> usize {
    match configured {
        0 => available.max(1),
        n => n,
    }
}

// =============================================================================
// HEADLESS MODE
// =============================================================================

fn run_headless(config: &Config) -> Result<()> {
    let headless = &config.headless;
    let slots = config.graphics.max_frames_in_flight;
    log::info!(
        "Headless run: {} frames, {}us device latency, {}us per recording",
        headless.frames,
        headless.device_latency_us,
        headless.record_cost_us
    );

    let latency = Duration::from_micros(headless.device_latency_us);
    let device = HeadlessDevice::without_timeline(latency);
    let sync = FrameSync::new(&device, slots)?;
    let recorder = SimulatedPass::new(Duration::from_micros(headless.record_cost_us));
    let (graph, _) = deferred_graph(&device, &sync, DeferredPasses::uniform(Arc::new(recorder)))?;

    // No hardware queues to count; one worker per core, at most one per pass
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    let workers = worker_count(config.renderer.worker_threads, cores.min(graph.passes().len()));
    let pool = RenderThreadPool::new(
        Arc::clone(&device),
        workers,
        config.renderer.command_buffers_per_worker,
    )?;
    let presenter = HeadlessPresenter::new(Arc::clone(&device), headless.image_count);
    let mut renderer = Renderer::new(Arc::clone(&device), pool, sync, graph, presenter)?;

    let mut scene = DemoScene::new(
        SceneState::new(slots),
        config.scene.clone(),
        config.window.width,
        config.window.height,
    );
    let input = InputState::default();

    let start = Instant::now();
    let mut skipped = 0u64;
    for _ in 0..headless.frames {
        if renderer.frame(&mut scene, &input)? == FrameStatus::TargetOutOfDate {
            skipped += 1;
        }
    }
    renderer.wait_idle()?;
    let elapsed = start.elapsed().as_secs_f64();

    log::info!(
        "Rendered {} frames in {:.2}s ({:.0} FPS, {} skipped, {} submissions)",
        renderer.frame_index(),
        elapsed,
        renderer.frame_index() as f64 / elapsed.max(f64::EPSILON),
        skipped,
        device.submission_count()
    );
    for (name, stats) in renderer.graph().ordering_stats() {
        log::debug!("{}: {} signals, {} waits", name, stats.signals, stats.waits);
    }
    drop(renderer);

    let violations = device.violations();
    for violation in &violations {
        log::error!("{}", violation);
    }
    if !violations.is_empty() {
        anyhow::bail!("{} semaphore rule violations", violations.len());
    }
    log::info!("No semaphore rule violations");
    Ok(())
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Main application struct holding the renderer and its window.
///
/// IMPORTANT: Field order matters for Drop! The renderer idles the device and
/// joins its workers before the targets it renders to go, and the window
/// outlives the surface inside the presenter.
struct App {
    // ─────────────────────────────────────────────────────────────────────────
    // RENDERING
    // ─────────────────────────────────────────────────────────────────────────
    renderer: Option<Renderer<VulkanDevice, VulkanPresenter>>,
    /// Per-slot offscreen images, swapped on resize
    targets: Option<Arc<RwLock<RenderTargets>>>,
    device: Option<Arc<VulkanDevice>>,

    // ─────────────────────────────────────────────────────────────────────────
    // SCENE & INPUT
    // ─────────────────────────────────────────────────────────────────────────
    scene: Option<DemoScene>,
    input: InputState,
    watcher: Option<ConfigWatcher>,

    // ─────────────────────────────────────────────────────────────────────────
    // CONFIGURATION
    // ─────────────────────────────────────────────────────────────────────────
    config: Config,
    quit_key: Option<KeyCode>,
    fullscreen_key: Option<KeyCode>,

    // ─────────────────────────────────────────────────────────────────────────
    // STATE FLAGS
    // ─────────────────────────────────────────────────────────────────────────
    /// Set when the window is resized - triggers swapchain and target recreation
    needs_resize: bool,
    /// Set when the window is minimized (size = 0) - skip rendering
    is_minimized: bool,
    is_fullscreen: bool,
    /// First render error; ends the event loop and the process
    error: Option<anyhow::Error>,

    // ─────────────────────────────────────────────────────────────────────────
    // FPS TRACKING
    // ─────────────────────────────────────────────────────────────────────────
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,

    // Last: the surface must be destroyed before the window
    window: Option<Arc<Window>>,
}

impl App {
    fn new(config: Config) -> Self {
        let now = Instant::now();
        Self {
            renderer: None,
            targets: None,
            device: None,
            scene: None,
            input: InputState::default(),
            watcher: None,
            quit_key: config.controls.quit(),
            fullscreen_key: config.controls.fullscreen(),
            is_fullscreen: config.window.fullscreen,
            config,
            needs_resize: false,
            is_minimized: false,
            error: None,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
            window: None,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Build the device, the presenter and the frame graph for `window`.
    fn init_vulkan(&mut self, window: &Arc<Window>) -> Result<()> {
        log::info!("Initializing Vulkan...");
        let size = window.inner_size();
        let slots = self.config.graphics.max_frames_in_flight;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Create Vulkan device (one queue per worker plus present)
        // ─────────────────────────────────────────────────────────────────────
        // Enable validation layers based on config (and debug build)
        let enable_validation = cfg!(debug_assertions) && self.config.debug.validation_layers;
        let display = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let queue_count = match self.config.renderer.worker_threads {
            0 => 0,
            workers => workers + 1,
        };
        let device =
            VulkanDevice::new(&self.config.window.title, enable_validation, display, queue_count)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Surface and swapchain
        // ─────────────────────────────────────────────────────────────────────
        let surface = Surface::new(&device, window.as_ref())?;
        let presenter = VulkanPresenter::new(
            Arc::clone(&device),
            surface,
            size.width,
            size.height,
            self.config.get_present_mode(),
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Per-slot sync objects and offscreen targets
        // ─────────────────────────────────────────────────────────────────────
        let sync = FrameSync::new(&device, slots)?;
        let extent = presenter.extent().unwrap_or(vk::Extent2D {
            width: size.width.max(1),
            height: size.height.max(1),
        });
        let targets = Arc::new(RwLock::new(RenderTargets::new(&device, slots, extent)?));

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Frame graph over the deferred passes
        // ─────────────────────────────────────────────────────────────────────
        let scene_state = SceneState::new(slots);
        let context = PassContext::new(
            Arc::clone(&device),
            Arc::clone(&targets),
            Arc::clone(presenter.targets()),
            Arc::clone(&scene_state),
        );
        let (graph, _) = deferred_graph(&device, &sync, context.deferred_passes())?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Worker pool and renderer
        // ─────────────────────────────────────────────────────────────────────
        let workers = worker_count(
            self.config.renderer.worker_threads,
            device.worker_queue_count(),
        );
        let pool = RenderThreadPool::new(
            Arc::clone(&device),
            workers,
            self.config.renderer.command_buffers_per_worker,
        )?;
        let renderer = Renderer::new(Arc::clone(&device), pool, sync, graph, presenter)?;

        self.scene = Some(DemoScene::new(
            scene_state,
            self.config.scene.clone(),
            size.width,
            size.height,
        ));
        self.watcher = match ConfigWatcher::new(DEFAULT_CONFIG_PATH) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                log::warn!("Config hot reload disabled: {:#}", err);
                None
            }
        };
        self.renderer = Some(renderer);
        self.targets = Some(targets);
        self.device = Some(device);
        self.is_minimized = size.width == 0 || size.height == 0;
        Ok(())
    }

    /// Recreate the swapchain and the size-dependent targets.
    fn recreate_targets(&mut self) -> Result<()> {
        let (Some(window), Some(renderer), Some(targets), Some(device)) =
            (&self.window, &mut self.renderer, &self.targets, &self.device)
        else {
            return Ok(());
        };

        let size = window.inner_size();
        // Don't recreate while minimized (size = 0)
        if size.width == 0 || size.height == 0 {
            self.is_minimized = true;
            return Ok(());
        }

        // Wait for GPU to finish all work before destroying resources. No
        // frame is in flight on the workers between two `frame` calls.
        renderer.wait_idle()?;
        renderer.presenter_mut().recreate(size.width, size.height)?;
        let extent = renderer
            .presenter()
            .extent()
            .context("Swapchain missing after recreation")?;
        *targets.write() = RenderTargets::new(device, renderer.graph().slot_count(), extent)?;

        if let Some(scene) = self.scene.as_mut() {
            scene.resize(extent.width, extent.height);
        }
        self.needs_resize = false;
        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render a single frame. Returns whether a frame was presented.
    fn render_frame(&mut self) -> Result<bool> {
        // Skip rendering if minimized
        if self.is_minimized {
            return Ok(false);
        }

        // Hot-reloaded scene settings apply from the next update on
        if let (Some(watcher), Some(scene)) = (&self.watcher, self.scene.as_mut()) {
            if let Some(settings) = watcher.poll() {
                scene.apply_config(settings);
            }
        }

        let outdated = self
            .renderer
            .as_ref()
            .is_some_and(|renderer| renderer.presenter().needs_recreate());
        if self.needs_resize || outdated {
            self.recreate_targets()?;
            if self.is_minimized {
                return Ok(false);
            }
        }

        let (Some(renderer), Some(scene)) = (self.renderer.as_mut(), self.scene.as_mut()) else {
            return Ok(false);
        };
        let status = renderer.frame(scene, &self.input)?;
        self.input.end_frame();

        match status {
            FrameStatus::Presented { .. } => Ok(true),
            FrameStatus::TargetOutOfDate => {
                self.needs_resize = true;
                Ok(false)
            }
        }
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                // Enter fullscreen (use current monitor)
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            self.needs_resize = true;
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;
            if let Some(ref window) = self.window {
                let mode = if self.is_fullscreen { "fullscreen" } else { "windowed" };
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{}]",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                    mode
                ));
            }
            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{:#}", err);
        self.error.get_or_insert(err);
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // Create window with settings from config
        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        // Set fullscreen if configured
        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::anyhow!("Failed to create window: {}", e));
                return;
            }
        };

        // Initialize Vulkan
        if let Err(e) = self.init_vulkan(&window) {
            self.fail(event_loop, e.context("Failed to initialize Vulkan"));
            return;
        }

        self.window = Some(window);
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            // ─────────────────────────────────────────────────────────────────
            // CLOSE REQUEST
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            // ─────────────────────────────────────────────────────────────────
            // WINDOW RESIZED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                if size.width == 0 || size.height == 0 {
                    self.is_minimized = true;
                } else {
                    self.is_minimized = false;
                    self.needs_resize = true;
                }
            }

            // ─────────────────────────────────────────────────────────────────
            // REDRAW REQUESTED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(true) => self.update_fps(),
                Ok(false) => {}
                Err(e) => self.fail(event_loop, e.context("Render error")),
            },

            // ─────────────────────────────────────────────────────────────────
            // KEYBOARD INPUT
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && !event.repeat {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        if Some(key) == self.quit_key {
                            log::info!("{:?} pressed, exiting...", key);
                            event_loop.exit();
                        } else if Some(key) == self.fullscreen_key {
                            self.toggle_fullscreen();
                        }
                    }
                }
            }

            // ─────────────────────────────────────────────────────────────────
            // MOUSE: left drag turns the camera
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.input.set_dragging(state == ElementState::Pressed);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input.cursor_moved(position.x, position.y);
            }

            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    /// We use this to request continuous redraws for maximum FPS.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // The renderer idles the device and joins its workers; everything
        // else is released by field order.
        self.renderer = None;

        log::info!("Cleanup complete");
    }
}
