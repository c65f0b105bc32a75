mod handlers;
mod pages;
mod routes;

pub use routes::create_router;
