pub mod analytics;
pub mod bridge;
pub mod data;
pub mod helpers;
pub mod settings;
pub mod workspaces;
