pub mod sample_routes;

pub use sample_routes::samples_router;
