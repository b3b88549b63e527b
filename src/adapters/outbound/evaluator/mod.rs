/// Evaluator adapters driving the external Nix evaluator
mod nix_eval_jobs;

pub use nix_eval_jobs::{NixEvalJobs, NixEvalJobsOptions};
