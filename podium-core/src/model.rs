use std::any::Any;
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{HookError, PodError};
use crate::pod::PodRef;

/// Holds the pod a model is bound to. Embed one in every model type.
#[derive(Default)]
pub struct ModelBase {
    pod: OnceCell<PodRef>,
}

impl ModelBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pod(&self) -> Result<&PodRef, PodError> {
        self.pod.get().ok_or(PodError::Unbound)
    }

    pub fn is_bound(&self) -> bool {
        self.pod.get().is_some()
    }

    /// Binds a pod. Only the first call succeeds.
    pub fn bind(&self, pod: PodRef) -> Result<(), PodError> {
        self.pod.set(pod).map_err(|_| PodError::PodAlreadyBound)
    }
}

impl fmt::Debug for ModelBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBase")
            .field("pod", &self.pod.get().and_then(|p| p.id()))
            .finish()
    }
}

/// Access to the pod behind a model.
///
/// Usually derived with `#[derive(Bound)]` or the `#[model]` attribute.
pub trait Bound: Any {
    fn base(&self) -> &ModelBase;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;

    /// The bound pod. Every pod operation is reached through it.
    fn pod(&self) -> Result<&PodRef, PodError> {
        self.base().pod()
    }

    fn load_pod(&self, pod: PodRef) -> Result<(), PodError> {
        self.base().bind(pod)
    }
}

/// A user-facing wrapper around a pod, notified of lifecycle transitions.
///
/// All hooks default to doing nothing. A hook error aborts the operation
/// that raised the event.
pub trait Model: Bound {
    fn after_dispense(&self) -> Result<(), HookError> {
        Ok(())
    }

    fn after_open(&self) -> Result<(), HookError> {
        Ok(())
    }

    fn before_store(&self) -> Result<(), HookError> {
        Ok(())
    }

    fn after_store(&self) -> Result<(), HookError> {
        Ok(())
    }

    fn before_delete(&self) -> Result<(), HookError> {
        Ok(())
    }

    fn after_delete(&self) -> Result<(), HookError> {
        Ok(())
    }
}

/// Shared handle to a model.
pub type ModelRef = Rc<dyn Model>;

/// Creates an unbound model instance.
pub type ModelConstructor = fn() -> ModelRef;

impl dyn Model {
    pub fn is<T: Model>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Model>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast<T: Model>(self: Rc<Self>) -> Option<Rc<T>> {
        self.into_any().downcast::<T>().ok()
    }
}

impl fmt::Debug for dyn Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model").field("base", self.base()).finish()
    }
}

/// Constructor for any default-constructible model type.
pub fn constructor<T: Model + Default>() -> ModelRef {
    Rc::new(T::default())
}

/// The model used when no formatter picks anything more specific.
#[derive(Debug, Default)]
pub struct GenericModel {
    base: ModelBase,
}

impl Bound for GenericModel {
    fn base(&self) -> &ModelBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl Model for GenericModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_model_reports_unbound() {
        let model = GenericModel::default();
        assert!(!model.base().is_bound());
        assert!(matches!(model.pod(), Err(PodError::Unbound)));
    }

    #[test]
    fn downcast_generic() {
        let model: ModelRef = constructor::<GenericModel>();
        assert!(model.is::<GenericModel>());
        assert!(model.downcast_ref::<GenericModel>().is_some());
        assert!(model.downcast::<GenericModel>().is_some());
    }
}
