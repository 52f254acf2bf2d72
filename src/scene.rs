// Scene - per-slot frame data
//
// The scene is updated on the control thread and read by pass recorders on
// worker threads. Every buffer slot has its own copy of the frame uniforms,
// so updating slot N never touches data a frame in flight on another slot
// is still reading.

use crate::config::SceneConfig;
use crate::renderer::Scene;
use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};
use parking_lot::Mutex;
use std::sync::Arc;

/// Screen-space rectangle in normalized [0, 1] coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenRect {
    pub min: Vec2,
    pub max: Vec2,
}

impl ScreenRect {
    pub fn from_center(center: Vec2, half_size: Vec2) -> Self {
        Self {
            min: (center - half_size).clamp(Vec2::ZERO, Vec2::ONE),
            max: (center + half_size).clamp(Vec2::ZERO, Vec2::ONE),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.max.x <= self.min.x || self.max.y <= self.min.y
    }
}

/// Everything the passes read for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    pub view: Mat4,
    pub projection: Mat4,
    pub sky_color: Vec4,
    pub object_color: Vec4,
    pub object_rect: ScreenRect,
    /// Light intensity as seen from the shadow pass.
    pub light_tint: Vec4,
    pub overlay_color: Vec4,
    pub overlay_rect: ScreenRect,
    pub time: f32,
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            sky_color: Vec4::ZERO,
            object_color: Vec4::ZERO,
            object_rect: ScreenRect::default(),
            light_tint: Vec4::ONE,
            overlay_color: Vec4::ZERO,
            overlay_rect: ScreenRect::default(),
            time: 0.0,
        }
    }
}

/// Per-slot uniform copies shared between the scene and the pass recorders.
pub struct SceneState {
    slots: Vec<Mutex<FrameUniforms>>,
}

impl SceneState {
    pub fn new(slot_count: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: (0..slot_count)
                .map(|_| Mutex::new(FrameUniforms::default()))
                .collect(),
        })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Snapshot of `slot`'s uniforms.
    pub fn read(&self, slot: usize) -> FrameUniforms {
        self.slots
            .get(slot)
            .map(|uniforms| *uniforms.lock())
            .unwrap_or_default()
    }

    fn write(&self, slot: usize, uniforms: FrameUniforms) {
        if let Some(target) = self.slots.get(slot) {
            *target.lock() = uniforms;
        }
    }
}

/// Mouse drag accumulated between two frames.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    cursor: Option<Vec2>,
    dragging: bool,
    drag: Vec2,
}

impl InputState {
    pub fn cursor_moved(&mut self, x: f64, y: f64) {
        let position = Vec2::new(x as f32, y as f32);
        if let (true, Some(previous)) = (self.dragging, self.cursor) {
            self.drag += position - previous;
        }
        self.cursor = Some(position);
    }

    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
    }

    /// Pixels dragged since the last `end_frame`.
    pub fn drag_velocity(&self) -> Vec2 {
        self.drag
    }

    pub fn end_frame(&mut self) {
        self.drag = Vec2::ZERO;
    }
}

const CAMERA_POSITION: Vec3 = Vec3::new(-2.2, 0.7, 4.2);
const TURN_RATE: f32 = 0.01;
const ORBIT_RADIUS: f32 = 1.2;
const OBJECT_HALF_SIZE: f32 = 0.06;

/// Small orbiting-object scene driving the deferred passes.
pub struct DemoScene {
    state: Arc<SceneState>,
    config: SceneConfig,
    direction: Vec3,
    aspect: f32,
    time: f32,
}

impl DemoScene {
    pub fn new(state: Arc<SceneState>, config: SceneConfig, width: u32, height: u32) -> Self {
        let mut scene = Self {
            state,
            config,
            direction: -Vec3::new(-3.0, 0.7, 3.0),
            aspect: 1.0,
            time: 0.0,
        };
        scene.resize(width, height);
        scene
    }

    pub fn state(&self) -> &Arc<SceneState> {
        &self.state
    }

    pub fn apply_config(&mut self, config: SceneConfig) {
        log::debug!("Scene settings updated: {:?}", config);
        self.config = config;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    fn uniforms(&self) -> FrameUniforms {
        let view = Mat4::look_at_rh(CAMERA_POSITION, CAMERA_POSITION + self.direction, Vec3::Y);
        let projection = Mat4::perspective_rh(45f32.to_radians(), self.aspect, 0.1, 100.0);

        let angle = self.time * self.config.object_speed;
        let object = Vec3::new(angle.cos() * ORBIT_RADIUS, 0.0, angle.sin() * ORBIT_RADIUS);
        let clip = projection * view * object.extend(1.0);
        let object_rect = if clip.w > 0.0 {
            let ndc = clip.xy() / clip.w;
            // Vulkan framebuffer y points down.
            let center = Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
            ScreenRect::from_center(center, Vec2::splat(OBJECT_HALF_SIZE / clip.w.max(1.0)))
        } else {
            ScreenRect::default()
        };

        let light = 0.6 + 0.4 * (self.time * 0.5).sin();
        FrameUniforms {
            view,
            projection,
            sky_color: Vec4::from_array(self.config.sky_color),
            object_color: Vec4::from_array(self.config.object_color),
            object_rect,
            light_tint: Vec4::new(light, light, light * 0.9, 1.0),
            overlay_color: Vec4::from_array(self.config.overlay_color),
            overlay_rect: ScreenRect {
                min: Vec2::new(0.0, 0.94),
                max: Vec2::ONE,
            },
            time: self.time,
        }
    }
}

impl Scene for DemoScene {
    type Input = InputState;

    fn update(&mut self, input: &InputState, slot: usize, dt: f32) {
        let drag = input.drag_velocity();
        self.direction.x -= drag.x * TURN_RATE;
        self.direction.y += drag.y * TURN_RATE;
        self.time += dt;
        self.state.write(slot, self.uniforms());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(slots: usize) -> DemoScene {
        DemoScene::new(SceneState::new(slots), SceneConfig::default(), 1280, 720)
    }

    #[test]
    fn updating_one_slot_leaves_the_others_alone() {
        let mut scene = scene(2);
        scene.update(&InputState::default(), 0, 0.016);
        let slot1_before = scene.state().read(1);

        scene.update(&InputState::default(), 0, 0.5);
        assert_eq!(scene.state().read(1), slot1_before);
        assert!((scene.state().read(0).time - 0.516).abs() < 1e-6);
    }

    #[test]
    fn object_moves_with_time_and_stays_on_screen() {
        let mut scene = scene(1);
        scene.update(&InputState::default(), 0, 0.0);
        let first = scene.state().read(0).object_rect;
        scene.update(&InputState::default(), 0, 0.5);
        let second = scene.state().read(0).object_rect;

        assert_ne!(first, second);
        for rect in [first, second] {
            assert!(!rect.is_empty());
            assert!(rect.min.cmpge(Vec2::ZERO).all() && rect.max.cmple(Vec2::ONE).all());
        }
    }

    #[test]
    fn dragging_turns_the_camera() {
        let mut scene = scene(1);
        scene.update(&InputState::default(), 0, 0.0);
        let still = scene.state().read(0).view;

        let mut input = InputState::default();
        input.cursor_moved(100.0, 100.0);
        input.set_dragging(true);
        input.cursor_moved(140.0, 90.0);
        assert_eq!(input.drag_velocity(), Vec2::new(40.0, -10.0));

        scene.update(&input, 0, 0.0);
        assert_ne!(scene.state().read(0).view, still);
        input.end_frame();
        assert_eq!(input.drag_velocity(), Vec2::ZERO);
    }

    #[test]
    fn reloaded_colors_apply_to_the_next_update() {
        let mut scene = scene(2);
        let config = SceneConfig {
            sky_color: [1.0, 0.0, 0.0, 1.0],
            ..SceneConfig::default()
        };
        scene.apply_config(config);
        scene.update(&InputState::default(), 1, 0.0);

        assert_eq!(scene.state().read(1).sky_color, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(scene.state().read(0).sky_color, Vec4::ZERO);
    }

    #[test]
    fn out_of_range_slots_read_defaults() {
        let scene = scene(1);
        assert_eq!(scene.state().read(5), FrameUniforms::default());
    }
}
