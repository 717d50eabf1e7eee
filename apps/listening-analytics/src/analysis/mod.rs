pub mod jobs;
pub mod join;
pub mod loader;
pub mod partition;
pub mod sampler;
pub mod sink;
pub mod window;
