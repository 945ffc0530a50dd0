use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::handler::{MissHandler, RingTarget, ShotReport, TargetHandler};
use super::profile::{TargetProfile, MANIFEST_FILE};
use crate::config::TargetsConfig;
use crate::detection::HitResult;
use crate::error::ProfileError;
use crate::pipeline::ProcessingJob;
use crate::registration::RegistrationParams;

/// Handlers keyed by target name, with one dispatch point for every
/// classified shot.
pub struct TargetRegistry {
    handlers: HashMap<String, Box<dyn TargetHandler>>,
    default_target: String,
    miss: MissHandler,
}

impl TargetRegistry {
    /// Build from explicit handlers. The default target must be among them.
    pub fn new(
        handlers: Vec<Box<dyn TargetHandler>>,
        default_target: impl Into<String>,
    ) -> Result<Self, ProfileError> {
        let default_target = default_target.into();
        let handlers: HashMap<String, Box<dyn TargetHandler>> = handlers
            .into_iter()
            .map(|h| (h.name().to_string(), h))
            .collect();

        if !handlers.contains_key(&default_target) {
            return Err(ProfileError::NotFound(default_target));
        }
        Ok(Self {
            handlers,
            default_target,
            miss: MissHandler,
        })
    }

    /// Load every profile directory under `config.dir`.
    ///
    /// A broken profile is skipped with a warning unless it is the default.
    pub fn load(config: &TargetsConfig, params: &RegistrationParams) -> Result<Self, ProfileError> {
        let entries = fs::read_dir(&config.dir).map_err(|e| ProfileError::Read {
            path: config.dir.display().to_string(),
            source: Box::new(e),
        })?;

        let mut handlers: Vec<Box<dyn TargetHandler>> = Vec::new();
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.join(MANIFEST_FILE).is_file() {
                continue;
            }
            match TargetProfile::load(&dir, params) {
                Ok(profile) => {
                    let training_dir = config.training_dir.join(&profile.name);
                    handlers.push(Box::new(
                        RingTarget::new(profile, params.clone()).with_training_dir(training_dir),
                    ));
                }
                Err(e) if is_profile_dir(&dir, &config.default_target) => return Err(e),
                Err(e) => tracing::warn!("Skipping target profile {}: {}", dir.display(), e),
            }
        }

        let registry = Self::new(handlers, config.default_target.clone())?;
        tracing::info!(
            "✓ Target registry ready: {} profile(s), default '{}'",
            registry.len(),
            registry.default_target
        );
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Handler for a detector-reported name, or the default target.
    pub fn resolve(&self, name: Option<&str>) -> &dyn TargetHandler {
        let found = name.and_then(|n| {
            let handler = self.handlers.get(n);
            if handler.is_none() {
                tracing::debug!("No profile named '{n}', using '{}'", self.default_target);
            }
            handler
        });
        match found.or_else(|| self.handlers.get(&self.default_target)) {
            Some(handler) => handler.as_ref(),
            None => &self.miss,
        }
    }

    pub fn dispatch(&self, result: &HitResult, job: &ProcessingJob) -> ShotReport {
        match result {
            HitResult::Hit(hit) => self.resolve(hit.target_name.as_deref()).handle(result, job),
            HitResult::Miss { .. } | HitResult::Unresolved { .. } => self.miss.handle(result, job),
        }
    }
}

fn is_profile_dir(dir: &Path, name: &str) -> bool {
    dir.file_name().is_some_and(|n| n == name)
}
