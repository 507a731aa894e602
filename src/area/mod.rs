//! Quest Areas
//!
//! Spatial regions used to lock quest progress to a part of a world.
//! Every variant rejects locations from another world before looking at
//! its own geometry.

pub mod cuboid;
pub mod sphere;

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use cuboid::Cuboid;
pub use sphere::Sphere;

/// Unique identifier of an area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaId(pub Uuid);

impl AreaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AreaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A position inside a world, as reported by the host server.
///
/// `z` is the height axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }
}

/// Spatial containment test shared by all area shapes
pub trait Region {
    fn id(&self) -> AreaId;

    /// World this region lives in
    fn world(&self) -> &str;

    /// Geometry-only test. Callers go through [`Region::in_region`].
    fn contains(&self, location: &Location, ignore_height: bool) -> bool;

    /// Check whether a location lies inside this region.
    ///
    /// With `ignore_height` the height axis is left out of the test
    /// entirely, so the check happens in the horizontal plane.
    fn in_region(&self, location: &Location, ignore_height: bool) -> bool {
        location.world == self.world() && self.contains(location, ignore_height)
    }
}

/// All area shapes a quest can be locked to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum Area {
    Sphere(Sphere),
    Cuboid(Cuboid),
}

impl Area {
    pub fn shape(&self) -> &'static str {
        match self {
            Area::Sphere(_) => "sphere",
            Area::Cuboid(_) => "cuboid",
        }
    }
}

impl Region for Area {
    fn id(&self) -> AreaId {
        match self {
            Area::Sphere(sphere) => sphere.id(),
            Area::Cuboid(cuboid) => cuboid.id(),
        }
    }

    fn world(&self) -> &str {
        match self {
            Area::Sphere(sphere) => sphere.world(),
            Area::Cuboid(cuboid) => cuboid.world(),
        }
    }

    fn contains(&self, location: &Location, ignore_height: bool) -> bool {
        match self {
            Area::Sphere(sphere) => sphere.contains(location, ignore_height),
            Area::Cuboid(cuboid) => cuboid.contains(location, ignore_height),
        }
    }
}

// Areas are referenced by id throughout the system; geometry can be edited
// without changing identity.
impl PartialEq for Area {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Area {}

impl Hash for Area {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl From<Sphere> for Area {
    fn from(sphere: Sphere) -> Self {
        Area::Sphere(sphere)
    }
}

impl From<Cuboid> for Area {
    fn from(cuboid: Cuboid) -> Self {
        Area::Cuboid(cuboid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_world_is_never_inside() {
        let sphere: Area = Sphere::new(AreaId::new(), Location::new("world1", 0.0, 0.0, 0.0), 1000.0).into();
        let cuboid: Area = Cuboid::new(
            AreaId::new(),
            Location::new("world1", -1000.0, -1000.0, -1000.0),
            Location::new("world1", 1000.0, 1000.0, 1000.0),
        )
        .into();

        let elsewhere = Location::new("world2", 0.0, 0.0, 0.0);
        for area in [&sphere, &cuboid] {
            assert!(!area.in_region(&elsewhere, false));
            assert!(!area.in_region(&elsewhere, true));
        }
    }

    #[test]
    fn test_area_equality_ignores_shape() {
        let id = AreaId::new();
        let sphere: Area = Sphere::new(id, Location::new("world1", 0.0, 0.0, 0.0), 3.0).into();
        let cuboid: Area = Cuboid::new(
            id,
            Location::new("world1", 0.0, 0.0, 0.0),
            Location::new("world1", 1.0, 1.0, 1.0),
        )
        .into();
        assert_eq!(sphere, cuboid);
    }

    #[test]
    fn test_area_from_toml() {
        let toml_src = r#"
shape = "sphere"
id = "7d4a8c56-2f0b-4d8e-9a55-0c1e2b3d4f60"
radius = 5.5

[center]
world = "world1"
x = 15.0
y = 15.0
z = 15.0
"#;
        let area: Area = toml::from_str(toml_src).unwrap();
        assert_eq!(area.shape(), "sphere");
        assert_eq!(area.world(), "world1");
        assert!(area.in_region(&Location::new("world1", 15.0, 15.0, 19.0), false));
    }
}
