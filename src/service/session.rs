//! Who the client is acting as: the signed-in owner and the active brand.

use std::sync::{Arc, PoisonError, RwLock};

use crate::backend::Scope;
use crate::{BrandId, SyncError, UserId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub owner: Option<UserId>,
    pub group: Option<BrandId>,
}

impl Session {
    /// Create an empty, signed-out session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(owner: impl Into<UserId>) -> Self {
        Self {
            owner: Some(owner.into()),
            group: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<BrandId>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// The query scope, or `None` when signed out.
    pub fn scope(&self) -> Option<Scope> {
        self.owner
            .clone()
            .map(|owner| Scope::new(owner, self.group.clone()))
    }
}

/// A [`Session`] shared by every service of one client, changeable at runtime.
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    inner: Arc<RwLock<Session>>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(session)),
        }
    }

    pub fn get(&self) -> Session {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn owner(&self) -> Option<UserId> {
        self.get().owner
    }

    pub fn set_owner(&self, owner: Option<UserId>) {
        self.write(|s| s.owner = owner);
    }

    pub fn set_group(&self, group: Option<BrandId>) {
        self.write(|s| s.group = group);
    }

    /// Sign out.
    pub fn clear(&self) {
        self.write(|s| *s = Session::default());
    }

    /// The query scope; `Unauthenticated` when no owner is set.
    pub fn scope(&self) -> Result<Scope, SyncError> {
        self.get().scope().ok_or(SyncError::Unauthenticated)
    }

    fn write(&self, f: impl FnOnce(&mut Session)) {
        f(&mut self.inner.write().unwrap_or_else(PoisonError::into_inner));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_out_session_has_no_scope() {
        let session = SharedSession::default();
        assert_eq!(session.scope(), Err(SyncError::Unauthenticated));
    }

    #[test]
    fn owner_and_group_form_the_scope() {
        let session = SharedSession::new(Session::signed_in("u1").with_group("b1"));
        let scope = session.scope().unwrap();
        assert_eq!(scope.owner, "u1");
        assert_eq!(scope.group, Some(BrandId::new("b1")));

        session.set_group(None);
        assert_eq!(session.scope().unwrap().group, None);

        session.clear();
        assert_eq!(session.owner(), None);
    }
}
