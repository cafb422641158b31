use serde::Serialize;

use crate::geo::BoundingBox;
use crate::models::sample::GeoPoint;

/// How fast the map layer should animate towards the new framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Calm,
    Fast,
}

/// Zoom range the map layer may settle in after fitting the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoomBand {
    pub min_zoom: u8,
    pub max_zoom: u8,
}

/// Framing directive handed to the rendering layer. Pure data; the map
/// library binding lives outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewportDirective {
    /// Nothing is known yet; show the default region.
    World { center: GeoPoint, zoom: u8 },
    /// A single known point, framed at street-block zoom.
    Focus { center: GeoPoint, zoom: u8 },
    /// Fit all known points inside the padded bounds.
    Fit {
        bounds: BoundingBox,
        center: GeoPoint,
        padding_px: u16,
        band: ZoomBand,
        transition: Transition,
    },
}
