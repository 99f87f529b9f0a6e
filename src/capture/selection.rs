//! Capture targets and content selection

use crate::media::FrameSize;
use serde::{Deserialize, Serialize};

/// Output size used when a filter carries no usable content rect
pub const FALLBACK_FRAME_SIZE: FrameSize = FrameSize::new(1920, 1080);

/// A rectangle in points
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// What a capture stream records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ContentTarget {
    Display { id: u32, name: String },
    #[serde(rename_all = "camelCase")]
    Window { id: u32, title: String, app_name: String },
    #[serde(rename_all = "camelCase")]
    Application { bundle_id: String, name: String },
}

impl ContentTarget {
    pub fn description(&self) -> String {
        match self {
            ContentTarget::Display { id, name } => format!("display {} ({})", id, name),
            ContentTarget::Window { title, app_name, .. } => format!("window \"{}\" of {}", title, app_name),
            ContentTarget::Application { name, .. } => format!("application {}", name),
        }
    }
}

/// Opaque handle to a shareable target, as handed over by a picker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFilter {
    pub target: ContentTarget,
    /// Bounds of the captured content in points
    pub content_rect: Rect,
    /// Backing scale factor (2.0 on Retina displays)
    pub point_pixel_scale: f64,
    #[serde(default)]
    pub excluded_window_ids: Vec<u32>,
}

impl ContentFilter {
    pub fn display(id: u32, name: impl Into<String>, content_rect: Rect, point_pixel_scale: f64) -> Self {
        Self {
            target: ContentTarget::Display { id, name: name.into() },
            content_rect,
            point_pixel_scale,
            excluded_window_ids: Vec::new(),
        }
    }

    fn scale(&self) -> f64 {
        if self.point_pixel_scale > 0.0 {
            self.point_pixel_scale
        } else {
            1.0
        }
    }
}

/// The target of the next recording plus an optional sub-rectangle.
///
/// Immutable once built; a new selection replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSelection {
    pub filter: ContentFilter,
    /// Display-local region in points, top-left origin
    pub source_rect: Option<Rect>,
}

impl ContentSelection {
    /// A whole display, window or application chosen in a picker
    pub fn picked(filter: ContentFilter) -> Self {
        Self {
            filter,
            source_rect: None,
        }
    }

    /// A user-drawn area on a display.
    ///
    /// `screen_rect` and `screen_origin` are in global screen coordinates
    /// with a bottom-left origin; the stored rect is display-local with a
    /// top-left origin and its pixel dimensions rounded up to even counts.
    pub fn area(filter: ContentFilter, screen_rect: Rect, screen_origin: (f64, f64), display_height: f64) -> Self {
        let scale = filter.scale();
        let local_x = screen_rect.x - screen_origin.0;
        let local_y = screen_rect.y - screen_origin.1;
        let flipped_y = display_height - local_y - screen_rect.height;

        let even_width = (screen_rect.width * scale / 2.0).ceil() * 2.0;
        let even_height = (screen_rect.height * scale / 2.0).ceil() * 2.0;

        Self {
            filter,
            source_rect: Some(Rect::new(local_x, flipped_y, even_width / scale, even_height / scale)),
        }
    }

    /// Pixel dimensions of the recording, always even
    pub fn frame_size(&self) -> FrameSize {
        let scale = self.filter.scale();
        let rect = match self.source_rect {
            Some(rect) if !rect.is_empty() => rect,
            _ if !self.filter.content_rect.is_empty() => self.filter.content_rect,
            _ => return FALLBACK_FRAME_SIZE,
        };
        FrameSize::new(to_pixels(rect.width, scale), to_pixels(rect.height, scale)).snapped_to_even()
    }
}

fn to_pixels(points: f64, scale: f64) -> u32 {
    // Tolerate float noise from point/pixel round trips
    (points * scale - 1e-6).ceil().max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retina_display() -> ContentFilter {
        ContentFilter::display(1, "Built-in", Rect::new(0.0, 0.0, 1512.0, 982.0), 2.0)
    }

    #[test]
    fn test_picked_display_size() {
        let selection = ContentSelection::picked(retina_display());
        assert_eq!(selection.frame_size(), FrameSize::new(3024, 1964));
    }

    #[test]
    fn test_area_flips_y_and_snaps_to_even() {
        let filter = ContentFilter::display(1, "External", Rect::new(0.0, 0.0, 1920.0, 1080.0), 1.0);
        let selection = ContentSelection::area(
            filter,
            Rect::new(1920.0 + 100.0, 200.0, 301.0, 151.0),
            (1920.0, 0.0),
            1080.0,
        );

        let rect = selection.source_rect.unwrap();
        assert_eq!(rect.x, 100.0);
        assert_eq!(rect.y, 1080.0 - 200.0 - 151.0);
        assert_eq!(rect.width, 302.0);
        assert_eq!(rect.height, 152.0);
        assert_eq!(selection.frame_size(), FrameSize::new(302, 152));
    }

    #[test]
    fn test_area_on_retina_keeps_point_units() {
        let selection = ContentSelection::area(retina_display(), Rect::new(10.0, 10.0, 100.25, 50.0), (0.0, 0.0), 982.0);
        let rect = selection.source_rect.unwrap();
        assert_eq!(rect.width, 101.0);
        assert_eq!(selection.frame_size(), FrameSize::new(202, 100));
    }

    #[test]
    fn test_empty_filter_falls_back() {
        let filter = ContentFilter {
            target: ContentTarget::Window {
                id: 7,
                title: "Untitled".to_string(),
                app_name: "Editor".to_string(),
            },
            content_rect: Rect::default(),
            point_pixel_scale: 2.0,
            excluded_window_ids: vec![],
        };
        assert_eq!(ContentSelection::picked(filter).frame_size(), FALLBACK_FRAME_SIZE);
    }

    #[test]
    fn test_odd_window_is_snapped() {
        let filter = ContentFilter {
            target: ContentTarget::Application {
                bundle_id: "com.example.app".to_string(),
                name: "Example".to_string(),
            },
            content_rect: Rect::new(0.0, 0.0, 801.0, 601.0),
            point_pixel_scale: 1.0,
            excluded_window_ids: vec![42],
        };
        assert_eq!(ContentSelection::picked(filter).frame_size(), FrameSize::new(802, 602));
    }
}
