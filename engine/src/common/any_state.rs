use std::any::Any;
use std::fmt;

/// Values an [`AnyState`] can hold. Cloneable so a node can run against a
/// scratch copy and keep its committed state when the run is discarded.
trait StateValue: Any + Send {
    fn clone_boxed(&self) -> Box<dyn StateValue>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> StateValue for T
where
    T: Any + Send + Clone,
{
    fn clone_boxed(&self) -> Box<dyn StateValue> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Type-erased slot for operator-owned state that survives across runs.
#[derive(Default)]
pub struct AnyState {
    boxed: Option<Box<dyn StateValue>>,
}

impl Clone for AnyState {
    fn clone(&self) -> Self {
        Self {
            boxed: self.boxed.as_ref().map(|boxed| boxed.clone_boxed()),
        }
    }
}

impl fmt::Debug for AnyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyState")
            .field("is_some", &self.boxed.is_some())
            .finish()
    }
}

impl AnyState {
    pub fn is_none(&self) -> bool {
        self.boxed.is_none()
    }

    pub fn is<T>(&self) -> bool
    where
        T: Any + Send + Clone,
    {
        self.get::<T>().is_some()
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Any + Send + Clone,
    {
        self.boxed
            .as_ref()
            .and_then(|boxed| boxed.as_any().downcast_ref::<T>())
    }

    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Any + Send + Clone,
    {
        self.boxed
            .as_mut()
            .and_then(|boxed| boxed.as_any_mut().downcast_mut::<T>())
    }

    pub fn set<T>(&mut self, value: T)
    where
        T: Any + Send + Clone,
    {
        self.boxed = Some(Box::new(value));
    }

    /// Returns the stored `T`, replacing any value of another type with the
    /// default.
    pub fn get_or_default<T>(&mut self) -> &mut T
    where
        T: Any + Send + Clone + Default,
    {
        if !self.is::<T>() {
            self.set(T::default());
        }

        match self.get_mut::<T>() {
            Some(value) => value,
            None => unreachable!("state was just set to the requested type"),
        }
    }
}
