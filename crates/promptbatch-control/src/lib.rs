pub mod config;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod provider;
pub mod routes;
pub mod state;
pub mod test_run;

#[cfg(test)]
mod testing;
