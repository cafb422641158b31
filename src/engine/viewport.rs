//! Viewport framing: turns the known points of a session into a map
//! directive that keeps everything visible while favoring tight framing
//! whenever a courier is on the road.

use crate::geo;
use crate::models::sample::GeoPoint;
use crate::models::viewport::{Transition, ViewportDirective, ZoomBand};

/// Everything the controller looks at. Identical inputs yield an identical
/// directive, so callers can suppress no-op emissions with a plain equality
/// check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramingInput {
    pub restaurant: Option<GeoPoint>,
    /// Live courier position, or the last trajectory point.
    pub courier: Option<GeoPoint>,
    pub customer: Option<GeoPoint>,
    pub delivery_active: bool,
}

const WORLD_CENTER: GeoPoint = GeoPoint { lat: 0.0, lng: 0.0 };
const WORLD_ZOOM: u8 = 2;

/// Street-block zoom for a lone known point; before a courier is assigned
/// the single pin is almost always the customer address being confirmed.
const FOCUS_ZOOM: u8 = 17;

/// Below this separation two markers share one pixel neighborhood; frame
/// them as a single point but keep both markers.
const COINCIDENT_KM: f64 = 0.025;

/// Extra breathing room around the bounds while a courier is live, on top of
/// the tier padding. Produces the GPS-navigation feel on every re-fit.
const ACTIVE_PADDING_BOOST: u16 = 32;

struct FitTier {
    up_to_km: f64,
    padding_px: u16,
    band: ZoomBand,
}

/// Distance-tiered framing. Tighter separations allow higher zoom; the
/// bands must stay monotonic across rows.
static FIT_TIERS: [FitTier; 5] = [
    FitTier {
        up_to_km: 1.0,
        padding_px: 80,
        band: ZoomBand {
            min_zoom: 15,
            max_zoom: 18,
        },
    },
    FitTier {
        up_to_km: 3.0,
        padding_px: 72,
        band: ZoomBand {
            min_zoom: 14,
            max_zoom: 17,
        },
    },
    FitTier {
        up_to_km: 8.0,
        padding_px: 64,
        band: ZoomBand {
            min_zoom: 13,
            max_zoom: 16,
        },
    },
    FitTier {
        up_to_km: 20.0,
        padding_px: 56,
        band: ZoomBand {
            min_zoom: 11,
            max_zoom: 14,
        },
    },
    FitTier {
        up_to_km: 60.0,
        padding_px: 48,
        band: ZoomBand {
            min_zoom: 10,
            max_zoom: 13,
        },
    },
];

static FALLBACK_TIER: FitTier = FitTier {
    up_to_km: f64::INFINITY,
    padding_px: 40,
    band: ZoomBand {
        min_zoom: 8,
        max_zoom: 12,
    },
};

fn fit_tier(distance_km: f64) -> &'static FitTier {
    FIT_TIERS
        .iter()
        .find(|tier| distance_km <= tier.up_to_km)
        .unwrap_or(&FALLBACK_TIER)
}

pub fn compute_viewport(input: &FramingInput) -> ViewportDirective {
    // order: restaurant, courier, customer; skip unknowns
    let known: Vec<GeoPoint> = [input.restaurant, input.courier, input.customer]
        .into_iter()
        .flatten()
        .collect();

    match known.as_slice() {
        [] => ViewportDirective::World {
            center: WORLD_CENTER,
            zoom: WORLD_ZOOM,
        },
        [only] => ViewportDirective::Focus {
            center: *only,
            zoom: FOCUS_ZOOM,
        },
        [a, b] => {
            let distance_km = geo::haversine_km(a, b);
            if distance_km < COINCIDENT_KM {
                return ViewportDirective::Focus {
                    center: geo::midpoint(a, b),
                    zoom: FOCUS_ZOOM,
                };
            }

            let tier = fit_tier(distance_km);
            let Ok(bounds) = geo::bounding_box(&known) else {
                return ViewportDirective::World {
                    center: WORLD_CENTER,
                    zoom: WORLD_ZOOM,
                };
            };

            if input.delivery_active && input.courier.is_some() {
                ViewportDirective::Fit {
                    bounds,
                    center: geo::midpoint(a, b),
                    padding_px: tier.padding_px + ACTIVE_PADDING_BOOST,
                    band: tier.band,
                    transition: Transition::Fast,
                }
            } else {
                ViewportDirective::Fit {
                    bounds,
                    center: geo::midpoint(a, b),
                    padding_px: tier.padding_px,
                    band: tier.band,
                    transition: Transition::Calm,
                }
            }
        }
        _ => {
            let distance_km = geo::max_pairwise_km(&known);
            if distance_km < COINCIDENT_KM {
                return ViewportDirective::Focus {
                    center: known[0],
                    zoom: FOCUS_ZOOM,
                };
            }

            let tier = fit_tier(distance_km);
            let Ok(bounds) = geo::bounding_box(&known) else {
                return ViewportDirective::World {
                    center: WORLD_CENTER,
                    zoom: WORLD_ZOOM,
                };
            };

            ViewportDirective::Fit {
                center: bounds.center(),
                bounds,
                padding_px: tier.padding_px,
                band: tier.band,
                transition: if input.delivery_active {
                    Transition::Fast
                } else {
                    Transition::Calm
                },
            }
        }
    }
}
