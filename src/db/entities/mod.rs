pub mod usage_sample;

pub mod prelude {
    pub use super::usage_sample::Entity as UsageSample;
}
