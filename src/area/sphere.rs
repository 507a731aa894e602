use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::{AreaId, Location, Region};

/// Spherical area around a center point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sphere {
    pub id: AreaId,
    pub center: Location,
    pub radius: f64,
}

impl Sphere {
    pub fn new(id: AreaId, center: Location, radius: f64) -> Self {
        Self { id, center, radius }
    }
}

impl Region for Sphere {
    fn id(&self) -> AreaId {
        self.id
    }

    fn world(&self) -> &str {
        &self.center.world
    }

    fn contains(&self, location: &Location, ignore_height: bool) -> bool {
        let dx = location.x - self.center.x;
        let dy = location.y - self.center.y;

        let mut distance_squared = dx * dx + dy * dy;
        if !ignore_height {
            let dz = location.z - self.center.z;
            distance_squared += dz * dz;
        }

        // Boundary counts as inside
        distance_squared.sqrt() <= self.radius
    }
}

impl PartialEq for Sphere {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Sphere {}

impl Hash for Sphere {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
