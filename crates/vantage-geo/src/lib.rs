//! `vantage-geo` – Coordinate geometry.
//!
//! The arithmetic that reconciles GPS/UTM world coordinates, device
//! orientation, and the renderer's local space.
//!
//! # Modules
//!
//! - [`orientation`] – [`Quaternion`][orientation::Quaternion] algebra,
//!   device Euler conversion, yaw extraction, and the fixed world ⇄ render
//!   axis remaps.
//! - [`utm`] – forward/inverse UTM projection with zone and band rules.
//! - [`geo_transform`] – [`GeoTransform`][geo_transform::GeoTransform]:
//!   lat/lon/alt ⇄ local metres around a write-once UTM reference.

pub mod geo_transform;
pub mod orientation;
pub mod utm;

pub use geo_transform::GeoTransform;
pub use orientation::{Pose, Quaternion, Vec3};
pub use utm::{Ellipsoid, UtmCoordinate};
