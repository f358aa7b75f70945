use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::UserId;

/// Who is acting and under which request, carried into every workflow call and log line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub actor: UserId,
    pub correlation_id: String,
}

impl RequestContext {
    pub fn new(actor: UserId, correlation_id: impl Into<String>) -> Self {
        Self { actor, correlation_id: correlation_id.into() }
    }

    pub fn for_actor(actor: impl Into<UserId>) -> Self {
        Self { actor: actor.into(), correlation_id: Uuid::new_v4().to_string() }
    }
}
