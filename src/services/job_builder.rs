use std::collections::HashMap;
use std::sync::Arc;

use crate::models::job::{GenerationJob, JobVariant};
use crate::models::lock::{JobLocks, VariantLock};
use crate::models::product::{CameraAngle, Size};
use crate::services::locks::{LockCompiler, SharedLocks};

/// Expands a batch into one job per color x angle x size.
pub struct JobQueueBuilder {
    compiler: LockCompiler,
    max_jobs: usize,
}

impl JobQueueBuilder {
    pub fn new(compiler: LockCompiler, max_jobs: usize) -> Self {
        Self { compiler, max_jobs }
    }

    /// Check dimensions and the job bound without building anything.
    pub fn check_bounds(
        &self,
        colors: &[String],
        angles: &[CameraAngle],
        sizes: &[Size],
    ) -> Result<usize, BuildError> {
        if colors.is_empty() || angles.is_empty() || sizes.is_empty() {
            return Err(BuildError::EmptyDimension);
        }

        let total = colors
            .len()
            .checked_mul(angles.len())
            .and_then(|n| n.checked_mul(sizes.len()))
            .unwrap_or(usize::MAX);

        if total > self.max_jobs {
            return Err(BuildError::TooManyJobs {
                requested: total,
                max: self.max_jobs,
            });
        }

        Ok(total)
    }

    /// Colors vary slowest, sizes fastest. Locks for a distinct color or angle
    /// are built once and shared by every job that uses them.
    pub fn build(
        &self,
        colors: &[String],
        angles: &[CameraAngle],
        sizes: &[Size],
        shared: &SharedLocks,
    ) -> Result<Vec<GenerationJob>, BuildError> {
        let total = self.check_bounds(colors, angles, sizes)?;

        let camera_locks: HashMap<CameraAngle, Arc<VariantLock>> = angles
            .iter()
            .map(|angle| (*angle, Arc::new(self.compiler.camera_lock(*angle))))
            .collect();

        let mut jobs = Vec::with_capacity(total);
        for color in colors {
            let color_lock = Arc::new(self.compiler.color_lock(color));
            for angle in angles {
                let camera = camera_locks
                    .get(angle)
                    .cloned()
                    .unwrap_or_else(|| Arc::new(self.compiler.camera_lock(*angle)));
                for size in sizes {
                    let locks = JobLocks {
                        product: Arc::clone(&shared.product),
                        color: Arc::clone(&color_lock),
                        camera: Arc::clone(&camera),
                        lighting: Arc::clone(&shared.lighting),
                        design: Arc::clone(&shared.design),
                    };
                    let variant = JobVariant {
                        color: color.trim().to_string(),
                        angle: *angle,
                        size: *size,
                    };
                    jobs.push(GenerationJob::new(jobs.len(), variant, locks));
                }
            }
        }

        tracing::debug!(jobs = jobs.len(), "Job queue built");
        Ok(jobs)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Colors, angles and sizes must each contain at least one entry")]
    EmptyDimension,

    #[error("Batch expands to {requested} jobs, above the limit of {max}")]
    TooManyJobs { requested: usize, max: usize },
}
