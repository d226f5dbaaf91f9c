//! Scratch-off surface that hides an unlocked sticker.
//!
//! The surface is an RGBA raster. Pointer drags erase round-capped strokes
//! from it, and once enough sampled pixels are transparent the surface
//! reports completion exactly once. A session binds a surface to one
//! (student, week) pair and turns that completion into a reveal action.

use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::WeekState;
use crate::snapshot::{Action, Snapshot};

const BASE_COLOR: [u8; 3] = [0xad, 0xb5, 0xbd];
const GRAIN_COLORS: [[u8; 3]; 4] = [
    [0xf8, 0xf9, 0xfa],
    [0xce, 0xd4, 0xda],
    [0x6c, 0x75, 0x7d],
    [0x34, 0x3a, 0x40],
];

#[derive(Debug, Clone, PartialEq)]
pub struct ScratchConfig {
    pub width: u32,
    pub height: u32,
    pub brush_radius: f32,
    /// Pixels whose alpha is below this count as scratched.
    pub alpha_threshold: u8,
    /// Every `sample_stride`-th pixel is inspected when measuring coverage.
    pub sample_stride: usize,
    pub completion_threshold: f64,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            width: 340,
            height: 450,
            brush_radius: 27.5,
            alpha_threshold: 10,
            sample_stride: 10,
            completion_threshold: 0.90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Where the surface is drawn on screen, in client coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl DisplayRect {
    /// Zigzag over the displayed card, in client coordinates.
    pub fn sweep(&self, spacing: f32) -> Vec<Point> {
        zigzag_path(self.width, self.height, spacing)
            .into_iter()
            .map(|p| Point::new(p.x + self.left, p.y + self.top))
            .collect()
    }

    pub fn to_surface(&self, config: &ScratchConfig, client_x: f32, client_y: f32) -> Point {
        let scale_x = if self.width > 0.0 {
            config.width as f32 / self.width
        } else {
            1.0
        };
        let scale_y = if self.height > 0.0 {
            config.height as f32 / self.height
        } else {
            1.0
        };
        Point::new(
            (client_x - self.left) * scale_x,
            (client_y - self.top) * scale_y,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchEvent {
    Completed,
}

#[derive(Debug, Clone)]
pub struct ScratchSurface {
    config: ScratchConfig,
    pixels: Vec<u8>,
    last_point: Option<Point>,
    coverage: f64,
    completed: bool,
}

impl ScratchSurface {
    pub fn new(config: ScratchConfig) -> Self {
        Self::with_rng(config, &mut rand::thread_rng())
    }

    /// Builds a fully opaque surface painted with grain drawn from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(config: ScratchConfig, rng: &mut R) -> Self {
        let pixel_count = config.width as usize * config.height as usize;
        let mut pixels = Vec::with_capacity(pixel_count * 4);
        for _ in 0..pixel_count {
            pixels.extend_from_slice(&[BASE_COLOR[0], BASE_COLOR[1], BASE_COLOR[2], 255]);
        }

        if pixel_count > 0 {
            for _ in 0..pixel_count / 2 {
                let index = rng.gen_range(0..pixel_count) * 4;
                let roll: f32 = rng.gen();
                let color = match roll {
                    r if r > 0.9 => GRAIN_COLORS[0],
                    r if r > 0.7 => GRAIN_COLORS[1],
                    r if r > 0.3 => GRAIN_COLORS[2],
                    _ => GRAIN_COLORS[3],
                };
                pixels[index..index + 3].copy_from_slice(&color);
            }
        }

        Self {
            config,
            pixels,
            last_point: None,
            coverage: 0.0,
            completed: false,
        }
    }

    pub fn config(&self) -> &ScratchConfig {
        &self.config
    }

    pub fn coverage(&self) -> f64 {
        self.coverage
    }

    /// Progress toward completion in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        if self.config.completion_threshold <= 0.0 {
            return 1.0;
        }
        (self.coverage / self.config.completion_threshold).min(1.0)
    }

    #[cfg(test)]
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    #[cfg(test)]
    pub fn is_drawing(&self) -> bool {
        self.last_point.is_some()
    }

    #[cfg(test)]
    pub fn alpha_at(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.config.width || y >= self.config.height {
            return None;
        }
        let index = (y as usize * self.config.width as usize + x as usize) * 4 + 3;
        self.pixels.get(index).copied()
    }

    pub fn pointer_down(&mut self, point: Point) -> Option<ScratchEvent> {
        self.last_point = Some(point);
        self.erase_segment(point, point);
        self.settle()
    }

    /// Erases along the path from the previous sample. Ignored while the
    /// pointer is up.
    pub fn pointer_move(&mut self, point: Point) -> Option<ScratchEvent> {
        let from = self.last_point?;
        self.erase_segment(from, point);
        self.last_point = Some(point);
        self.settle()
    }

    pub fn pointer_up(&mut self) {
        self.last_point = None;
    }

    /// Clears every pixel within `brush_radius` of the segment `from..to`.
    fn erase_segment(&mut self, from: Point, to: Point) {
        let radius = self.config.brush_radius;
        let width = self.config.width as i64;
        let height = self.config.height as i64;
        if width == 0 || height == 0 {
            return;
        }

        let min_x = ((from.x.min(to.x) - radius).floor() as i64).clamp(0, width - 1);
        let max_x = ((from.x.max(to.x) + radius).ceil() as i64).clamp(0, width - 1);
        let min_y = ((from.y.min(to.y) - radius).floor() as i64).clamp(0, height - 1);
        let max_y = ((from.y.max(to.y) + radius).ceil() as i64).clamp(0, height - 1);
        let radius_sq = radius * radius;

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                if distance_sq_to_segment(center, from, to) <= radius_sq {
                    let index = (y * width + x) as usize * 4;
                    self.pixels[index..index + 4].fill(0);
                }
            }
        }
    }

    fn measure_coverage(&self) -> f64 {
        let stride = self.config.sample_stride.max(1);
        let threshold = self.config.alpha_threshold;
        let mut sampled = 0usize;
        let mut cleared = 0usize;

        for alpha in self.pixels.iter().skip(3).step_by(stride * 4) {
            sampled += 1;
            if *alpha < threshold {
                cleared += 1;
            }
        }

        if sampled == 0 {
            return 0.0;
        }
        cleared as f64 / sampled as f64
    }

    fn settle(&mut self) -> Option<ScratchEvent> {
        self.coverage = self.measure_coverage();
        if self.completed || self.coverage < self.config.completion_threshold {
            return None;
        }
        self.completed = true;
        Some(ScratchEvent::Completed)
    }
}

fn distance_sq_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let length_sq = dx * dx + dy * dy;
    let t = if length_sq == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / length_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.x + t * dx, a.y + t * dy);
    (p.x - cx) * (p.x - cx) + (p.y - cy) * (p.y - cy)
}

/// Scratching one unlocked sticker. Dropping the session discards progress.
#[derive(Debug)]
pub struct ScratchSession {
    student_id: Uuid,
    week: u8,
    surface: ScratchSurface,
}

impl ScratchSession {
    /// Opens a session when `week` is unlocked but not yet revealed for the
    /// student.
    pub fn begin(
        snapshot: &Snapshot,
        student_id: Uuid,
        week: u8,
        surface: ScratchSurface,
    ) -> Option<Self> {
        snapshot.student(student_id)?;
        let state = snapshot.ledger.state(student_id, week);
        if state != WeekState::Unlocked {
            debug!(%student_id, week, ?state, "nothing to scratch");
            return None;
        }
        Some(Self {
            student_id,
            week,
            surface,
        })
    }

    pub fn week(&self) -> u8 {
        self.week
    }

    pub fn surface(&self) -> &ScratchSurface {
        &self.surface
    }

    pub fn pointer_down(&mut self, point: Point) -> Option<Action> {
        let event = self.surface.pointer_down(point);
        self.on_event(event)
    }

    pub fn pointer_move(&mut self, point: Point) -> Option<Action> {
        let event = self.surface.pointer_move(point);
        self.on_event(event)
    }

    pub fn pointer_up(&mut self) {
        self.surface.pointer_up();
    }

    fn on_event(&self, event: Option<ScratchEvent>) -> Option<Action> {
        match event? {
            ScratchEvent::Completed => {
                info!(
                    student_id = %self.student_id,
                    week = self.week,
                    coverage = self.surface.coverage(),
                    "scratch complete"
                );
                Some(Action::Reveal {
                    student_id: self.student_id,
                    week: self.week,
                })
            }
        }
    }
}

/// Back-and-forth sweep over a `width` x `height` area with rows `spacing`
/// apart, starting at the origin.
pub fn zigzag_path(width: f32, height: f32, spacing: f32) -> Vec<Point> {
    let spacing = spacing.max(1.0);
    let mut points = Vec::new();
    let mut y: f32 = 0.0;
    let mut left_to_right = true;

    loop {
        let row_y = y.min(height);
        let (start, end) = if left_to_right { (0.0, width) } else { (width, 0.0) };
        points.push(Point::new(start, row_y));
        points.push(Point::new(end, row_y));
        if row_y >= height {
            break;
        }
        y += spacing;
        left_to_right = !left_to_right;
    }

    points
}
