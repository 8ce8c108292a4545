//! Real Jezreel Valley / Lower Galilee locations for realistic test fixtures.
//!
//! Coordinates are approximate town and street positions around the
//! Sharona warehouse, all routable with the israel-and-palestine extract.

use day_route_planner::Coordinate;

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coords(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

pub const DEPOT: Location = Location::new("Sharona warehouse", 32.7254465, 35.4669505);

// ============================================================================
// Afula: six clients within a kilometer of each other
// ============================================================================

pub const AFULA: &[Location] = &[
    Location::new("Afula Herzl 10", 32.6078, 35.2897),
    Location::new("Afula Arlozorov 3", 32.6092, 35.2911),
    Location::new("Afula Yehoshua Hankin 21", 32.6065, 35.2880),
    Location::new("Afula Sderot Rabin 40", 32.6101, 35.2875),
    Location::new("Afula HaNasi 7", 32.6055, 35.2920),
    Location::new("Afula Jabotinsky 15", 32.6085, 35.2935),
];

// ============================================================================
// Kfar Tavor: five clients, a second dense group
// ============================================================================

pub const KFAR_TAVOR: &[Location] = &[
    Location::new("Kfar Tavor HaMeyasdim 2", 32.6868, 35.4214),
    Location::new("Kfar Tavor HaTavor 9", 32.6880, 35.4230),
    Location::new("Kfar Tavor HaGefen 4", 32.6855, 35.4200),
    Location::new("Kfar Tavor HaZayit 11", 32.6875, 35.4195),
    Location::new("Kfar Tavor HaRimon 6", 32.6860, 35.4240),
];

// ============================================================================
// Outlying towns: pairwise more than 2 km apart
// ============================================================================

pub const OUTLYING: &[Location] = &[
    Location::new("Nazareth Paulus VI", 32.6996, 35.3035),
    Location::new("Yokneam Illit HaMelacha", 32.6594, 35.1050),
    Location::new("Tiberias HaGalil", 32.7940, 35.5310),
    Location::new("Beit She'an Shaul HaMelech", 32.4973, 35.4962),
    Location::new("Nahalal Moshav", 32.6892, 35.1960),
    Location::new("Migdal HaEmek HaTavor", 32.6736, 35.2400),
];
