const NCR: &str = "National Capital Region";

/// Uppercase location substring → region. Checked in order; first hit wins,
/// so longer names sit before the shorter names they contain.
const LOCATION_REGIONS: &[(&str, &str)] = &[
    ("CITY OF MANILA", NCR),
    ("MANILA", NCR),
    ("QUEZON CITY", NCR),
    ("CALOOCAN", NCR),
    ("PASIG", NCR),
    ("MAKATI", NCR),
    ("TAGUIG", NCR),
    ("PASAY", NCR),
    ("MARIKINA", NCR),
    ("MANDALUYONG", NCR),
    ("PARANAQUE", NCR),
    ("PARAÑAQUE", NCR),
    ("LAS PIÑAS", NCR),
    ("LAS PINAS", NCR),
    ("MUNTINLUPA", NCR),
    ("VALENZUELA", NCR),
    ("MALABON", NCR),
    ("NAVOTAS", NCR),
    ("SAN JUAN CITY", NCR),
    ("PATEROS", NCR),
];

pub fn region_for_location(location: &str) -> Option<&'static str> {
    let loc = location.trim().to_uppercase();
    if loc.is_empty() {
        return None;
    }
    LOCATION_REGIONS
        .iter()
        .find(|(needle, _)| loc.contains(needle))
        .map(|(_, region)| *region)
}
