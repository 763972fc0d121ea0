//! The detector tiers (§4.2-§4.5) and the router that picks among them.

pub mod router;
pub mod verification;
pub mod yin;
