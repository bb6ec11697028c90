//! Reusable scratch buffers
//!
//! Weaving visits every method of a module and repeatedly needs short-lived
//! candidate lists. [`scoped`] borrows a `Vec` from a thread-local pool and
//! returns it on scope exit, including on early returns and panics, so the
//! allocations are reused across the pass without any global state
//! surviving it.

use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};

thread_local! {
    static POOL: RefCell<FxHashMap<TypeId, Vec<Box<dyn Any>>>> =
        RefCell::new(FxHashMap::default());
}

/// A pooled `Vec<T>` returned to the pool when dropped.
pub struct ScopedVec<T: 'static> {
    vec: Option<Vec<T>>,
}

impl<T: 'static> Deref for ScopedVec<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        self.vec.as_ref().expect("scoped vec taken")
    }
}

impl<T: 'static> DerefMut for ScopedVec<T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        self.vec.as_mut().expect("scoped vec taken")
    }
}

impl<T: 'static> Drop for ScopedVec<T> {
    fn drop(&mut self) {
        if let Some(mut vec) = self.vec.take() {
            vec.clear();
            let _ = POOL.try_with(|pool| {
                pool.borrow_mut()
                    .entry(TypeId::of::<T>())
                    .or_default()
                    .push(Box::new(vec));
            });
        }
    }
}

/// Borrow an empty `Vec<T>` from the thread-local pool.
pub fn scoped<T: 'static>() -> ScopedVec<T> {
    let vec = POOL.with(|pool| {
        pool.borrow_mut()
            .get_mut(&TypeId::of::<T>())
            .and_then(|stack| stack.pop())
            .and_then(|boxed| boxed.downcast::<Vec<T>>().ok())
            .map(|boxed| *boxed)
    });
    ScopedVec {
        vec: Some(vec.unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_reused_after_release() {
        let capacity = {
            let mut v = scoped::<u32>();
            v.extend([1, 2, 3, 4, 5, 6, 7, 8]);
            v.capacity()
        };

        let v = scoped::<u32>();
        assert!(v.is_empty());
        assert_eq!(v.capacity(), capacity);
    }

    #[test]
    fn distinct_element_types_do_not_collide() {
        let mut ints = scoped::<u32>();
        let mut strings = scoped::<String>();
        ints.push(7);
        strings.push("seven".to_string());
        assert_eq!(ints.len(), 1);
        assert_eq!(strings.len(), 1);
    }
}
