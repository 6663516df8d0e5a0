use crate::normalize::{NormalizeError, NormalizeResult, NormalizerPass, PassContext};
use crate::sql::query::Query;

/// Fails unless the statement references the tenant placeholder. Never rewrites.
#[derive(Debug, Clone)]
pub struct ScopePass {
    param: String,
}

impl ScopePass {
    pub fn new(param: &str) -> Self {
        Self {
            param: param.into(),
        }
    }
}

impl NormalizerPass for ScopePass {
    fn name(&self) -> &'static str {
        "scope"
    }

    fn apply(&self, query: &mut Query, _ctx: &PassContext<'_>) -> NormalizeResult<bool> {
        if query.references_param(&self.param) {
            Ok(false)
        } else {
            Err(NormalizeError::MissingScopeParam {
                param: self.param.clone(),
            })
        }
    }
}
