pub mod config;
pub mod db;
pub mod error;
pub mod methods;
pub mod pagination;
pub mod router;
pub mod state;

pub mod crypto {
    pub mod password;
    pub mod token;
}

pub mod models {
    pub mod session;
    pub mod user;
}

pub mod repositories {
    pub mod memory;
    pub mod session;
    pub mod user;
}

pub mod services {
    pub mod sessions;
}

pub mod handlers {
    pub mod authorization;
    pub mod health;
    pub mod payload;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod pipeline;
    pub mod rate_limit;
}

pub use config::Config;
pub use error::{AppError, Result};
pub use router::router;
pub use state::AppState;
