//! Session identity collaborator.
//!
//! Authentication lives outside this crate. Whatever owns the login flow
//! implements [`SessionProvider`]; the client only reads the current id to
//! attach it to REST calls (cookie) and to the push-channel handshake.

/// Supplies the current session id, if the user is signed in.
pub trait SessionProvider: Send + Sync {
    fn session_id(&self) -> Option<String>;
}

/// A fixed session id, e.g. read once from the environment.
#[derive(Debug, Clone, Default)]
pub struct StaticSession(Option<String>);

impl StaticSession {
    pub fn new(session_id: Option<String>) -> Self {
        Self(session_id.filter(|sid| !sid.is_empty()))
    }
}

impl SessionProvider for StaticSession {
    fn session_id(&self) -> Option<String> {
        self.0.clone()
    }
}

impl<F> SessionProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn session_id(&self) -> Option<String> {
        self()
    }
}
