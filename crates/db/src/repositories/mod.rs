pub mod render_job_repo;

pub use render_job_repo::RenderJobRepo;
