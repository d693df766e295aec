use std::{sync::Arc, ops::Deref};
use once_cell::sync::Lazy;

type LazyResult<T, E> = Lazy<Result<T, E>, Box<dyn FnOnce() -> Result<T, E> + Send + Sync>>;

/// A shared, fallible value computed at most once, on first access.
#[derive(Debug)]
pub struct LazyFallibleArc<T, E>(Arc<LazyResult<T, E>>);

impl<T, E> LazyFallibleArc<T, E> {
    #[inline(always)]
    pub fn new<F>(with: F) -> Self
        where F: FnOnce() -> Result<T, E> + Send + Sync + 'static
    {
        LazyFallibleArc(Arc::new(Lazy::new(Box::new(with))))
    }

    pub fn force(&self) -> Result<&T, &E> {
        Lazy::force(&*self.0).as_ref()
    }

    /// Returns `true` if the value has already been computed.
    pub fn is_forced(&self) -> bool {
        Lazy::get(&*self.0).is_some()
    }

    /// Returns `true` if `self` and `other` share the same computation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T, E> Clone for LazyFallibleArc<T, E> {
    #[inline(always)]
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T, E> Deref for LazyFallibleArc<T, E> {
    type Target = Result<T, E>;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &**self.0
    }
}
