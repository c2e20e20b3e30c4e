mod generation_jobs;
mod helpers;
mod index_jobs;
