//! Factory traits controlling the life-cycle of pooled resources

use std::sync::Arc;
use std::time::Instant;

use crate::errors::FactoryResult;
use crate::pool::ObjectPool;
use crate::pooled::PooledObject;

/// Creates, destroys and validates the resources served by a pool.
///
/// # Examples
///
/// ```
/// use objectpool::{FactoryResult, ObjectFactory, ObjectPool};
///
/// struct Buffers;
///
/// impl ObjectFactory<Vec<u8>> for Buffers {
///     fn make_object(&self, _pool: &ObjectPool<Vec<u8>>) -> FactoryResult<Vec<u8>> {
///         Ok(Vec::with_capacity(4096))
///     }
///
///     fn destroy_object(
///         &self,
///         _pool: &ObjectPool<Vec<u8>>,
///         _object: &Vec<u8>,
///     ) -> FactoryResult<()> {
///         Ok(())
///     }
/// }
/// ```
pub trait ObjectFactory<T>: Send + Sync {
    /// Create a resource for `pool`.
    fn make_object(&self, pool: &ObjectPool<T>) -> FactoryResult<T>;

    /// Release a resource the pool no longer needs.
    ///
    /// Failures are logged; the object is removed from the pool regardless.
    fn destroy_object(&self, pool: &ObjectPool<T>, object: &T) -> FactoryResult<()>;

    /// Whether `object` can still be handed out.
    fn validate_object(&self, _pool: &ObjectPool<T>, _object: &T) -> FactoryResult<bool> {
        Ok(true)
    }
}

/// A factory whose resources must be activated before every borrow and
/// deactivated when they come back.
///
/// A failing hook gets the object destroyed instead of served.
pub trait ActivableObjectFactory<T>: ObjectFactory<T> {
    fn activate_object(&self, pool: &ObjectPool<T>, object: &PooledObject<T>) -> FactoryResult<()>;

    fn deactivate_object(
        &self,
        pool: &ObjectPool<T>,
        object: &PooledObject<T>,
    ) -> FactoryResult<()>;
}

/// Implemented by resources that know when they were last used.
///
/// Enables the abandoned timeout, see
/// [`PoolConfiguration::with_usage_reporting`](crate::PoolConfiguration::with_usage_reporting).
pub trait UsageReporter {
    fn last_used_time(&self) -> Option<Instant>;
}

/// The factory held by a pool, with its capabilities resolved at construction.
pub(crate) enum Factory<T> {
    Plain(Arc<dyn ObjectFactory<T>>),
    Activable(Arc<dyn ActivableObjectFactory<T>>),
}

impl<T> Factory<T> {
    pub(crate) fn is_activable(&self) -> bool {
        matches!(self, Factory::Activable(_))
    }

    pub(crate) fn make(&self, pool: &ObjectPool<T>) -> FactoryResult<T> {
        match self {
            Factory::Plain(factory) => factory.make_object(pool),
            Factory::Activable(factory) => factory.make_object(pool),
        }
    }

    pub(crate) fn destroy(&self, pool: &ObjectPool<T>, object: &T) -> FactoryResult<()> {
        match self {
            Factory::Plain(factory) => factory.destroy_object(pool, object),
            Factory::Activable(factory) => factory.destroy_object(pool, object),
        }
    }

    /// Validation errors count as a failed validation.
    pub(crate) fn validate(&self, pool: &ObjectPool<T>, object: &T) -> bool {
        let result = match self {
            Factory::Plain(factory) => factory.validate_object(pool, object),
            Factory::Activable(factory) => factory.validate_object(pool, object),
        };
        result.unwrap_or(false)
    }

    pub(crate) fn activate(
        &self,
        pool: &ObjectPool<T>,
        object: &PooledObject<T>,
    ) -> FactoryResult<()> {
        match self {
            Factory::Plain(_) => Ok(()),
            Factory::Activable(factory) => factory.activate_object(pool, object),
        }
    }

    pub(crate) fn deactivate(
        &self,
        pool: &ObjectPool<T>,
        object: &PooledObject<T>,
    ) -> FactoryResult<()> {
        match self {
            Factory::Plain(_) => Ok(()),
            Factory::Activable(factory) => factory.deactivate_object(pool, object),
        }
    }
}
