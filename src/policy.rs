//! Blur policy: which privacy blur a request gets when it does not ask for one.
//!
//! [`BlurPolicyConfig`] holds the process-wide defaults. It is read by every
//! request and replaced only as a whole through [`BlurPolicy::set`]; readers
//! take an `Arc` snapshot, so an in-flight request keeps the policy it
//! started with even if an update lands halfway through.
//!
//! [`resolve`] is the pure decision function. Precedence, first match wins:
//!
//! 1. feature disabled → `none`
//! 2. blur forced by the request → that mode
//! 3. the context's default is `none` → `none`
//! 4. policy ignores ML suggestions → the context default
//! 5. private context → the private default
//! 6. public context and ML suggested a blur → the public default
//! 7. otherwise → `none`

use crate::transform::{BlurMode, Context};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlurPolicyConfig {
    /// Opaque revision tag, bumped by whoever publishes a new policy.
    pub version: u32,
    pub public_default: BlurMode,
    pub private_default: BlurMode,
    /// Only blur public images when the detector suggested it.
    pub respect_ml_suggestion: bool,
    /// Kill switch: no request gets any blur, forced or not.
    pub disabled: bool,
}

impl Default for BlurPolicyConfig {
    fn default() -> Self {
        Self {
            version: 1,
            public_default: BlurMode::Face,
            private_default: BlurMode::None,
            respect_ml_suggestion: true,
            disabled: false,
        }
    }
}

impl BlurPolicyConfig {
    pub fn default_for(&self, context: Context) -> BlurMode {
        match context {
            Context::Public => self.public_default,
            Context::Private => self.private_default,
        }
    }
}

/// Resolve the blur mode for one request against a policy snapshot.
pub fn resolve(
    policy: &BlurPolicyConfig,
    context: Context,
    ml_suggested_blur: bool,
    force: Option<BlurMode>,
    disabled: bool,
) -> BlurMode {
    if disabled {
        return BlurMode::None;
    }
    if let Some(mode) = force {
        return mode;
    }
    let default = policy.default_for(context);
    if default == BlurMode::None {
        return BlurMode::None;
    }
    if !policy.respect_ml_suggestion {
        return default;
    }
    match context {
        Context::Private => policy.private_default,
        Context::Public if ml_suggested_blur => policy.public_default,
        Context::Public => BlurMode::None,
    }
}

/// True when the outcome of [`resolve`] flips with the ML suggestion, so the
/// metadata document must be fetched before the blur mode is known.
pub fn depends_on_ml(
    policy: &BlurPolicyConfig,
    context: Context,
    force: Option<BlurMode>,
    disabled: bool,
) -> bool {
    resolve(policy, context, true, force, disabled) != resolve(policy, context, false, force, disabled)
}

/// Shared, swappable holder for the live policy.
#[derive(Debug, Default)]
pub struct BlurPolicy {
    current: RwLock<Arc<BlurPolicyConfig>>,
}

impl BlurPolicy {
    pub fn new(config: BlurPolicyConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Consistent view of the policy for the duration of one request.
    pub fn snapshot(&self) -> Arc<BlurPolicyConfig> {
        Arc::clone(&self.current.read())
    }

    /// Replace the policy. Requests that already took a snapshot keep it.
    pub fn set(&self, config: BlurPolicyConfig) {
        info!(
            version = config.version,
            public_default = %config.public_default,
            private_default = %config.private_default,
            respect_ml_suggestion = config.respect_ml_suggestion,
            disabled = config.disabled,
            "blur policy updated"
        );
        *self.current.write() = Arc::new(config);
    }
}
