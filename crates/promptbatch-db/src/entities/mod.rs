pub mod batch_files;
pub mod batch_jobs;
pub mod test_jobs;
pub mod uploaded_files;
