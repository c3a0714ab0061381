pub mod cache;
pub mod db;
pub mod server;
pub mod services;
pub mod web;

#[cfg(test)]
pub(crate) mod test_support;
