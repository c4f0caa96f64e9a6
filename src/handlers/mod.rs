pub mod drive_handlers;
pub mod folder_handlers;
pub mod health_handlers;
pub mod location_handlers;
pub mod owner_handlers;

use serde::Deserialize;

/// Body of the `PUT .../status` endpoints.
#[derive(Debug, Deserialize)]
pub struct ActiveUpdate {
    pub active: bool,
}
