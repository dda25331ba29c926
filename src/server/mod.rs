mod handlers;
mod models;
mod render;
mod state;

pub use handlers::run_server;
