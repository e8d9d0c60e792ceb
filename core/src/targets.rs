pub const UI: &str = "ui";
pub const PRICING: &str = "pricing";
pub const OBJECTS: &str = "objects";
pub const STORAGE: &str = "storage";
pub const API: &str = "api";

pub const ALL: [&str; 5] = [UI, PRICING, OBJECTS, STORAGE, API];
