//! Ad-hoc scope guards.
//!
//! A scope guard runs a closure when it goes out of scope,
//! both on normal exit and when a panic unwinds through it.
//! [`guard`] additionally owns a value that the closure receives,
//! which is handy when the thing to clean up is created in the scope.

#![warn(missing_docs)]

use std::{mem::ManuallyDrop, ops::{Deref, DerefMut}};

/// Guard that owns a value and hands it to a closure on drop.
///
/// Created by [`guard`].
pub struct ScopeGuard<T, F>
    where F: FnOnce(T)
{
    // INVARIANT: Both are initialized until drop or dismiss.
    value: ManuallyDrop<T>,
    on_exit: ManuallyDrop<F>,
}

/// Guard the given value.
///
/// When the returned guard is dropped,
/// `on_exit` is called with the value.
///
/// # Examples
///
/// ```
/// # use scope_exit::guard;
/// use std::cell::Cell;
/// let dropped = Cell::new(None);
/// {
///     let path = guard(String::from("a.dot"), |p| dropped.set(Some(p)));
///     assert_eq!(path.len(), 5);
/// }
/// assert_eq!(dropped.take().as_deref(), Some("a.dot"));
/// ```
pub fn guard<T, F>(value: T, on_exit: F) -> ScopeGuard<T, F>
    where F: FnOnce(T)
{
    ScopeGuard{
        value: ManuallyDrop::new(value),
        on_exit: ManuallyDrop::new(on_exit),
    }
}

impl<T, F> ScopeGuard<T, F>
    where F: FnOnce(T)
{
    /// Take the value back without running the closure.
    pub fn dismiss(this: Self) -> T
    {
        let mut this = ManuallyDrop::new(this);
        // SAFETY: this is never dropped, so neither field is used again.
        unsafe {
            ManuallyDrop::drop(&mut this.on_exit);
            ManuallyDrop::take(&mut this.value)
        }
    }
}

impl<T, F> Deref for ScopeGuard<T, F>
    where F: FnOnce(T)
{
    type Target = T;

    fn deref(&self) -> &T
    {
        &self.value
    }
}

impl<T, F> DerefMut for ScopeGuard<T, F>
    where F: FnOnce(T)
{
    fn deref_mut(&mut self) -> &mut T
    {
        &mut self.value
    }
}

impl<T, F> Drop for ScopeGuard<T, F>
    where F: FnOnce(T)
{
    fn drop(&mut self)
    {
        // SAFETY: Fields are not used after drop.
        let (value, on_exit) = unsafe {
            (
                ManuallyDrop::take(&mut self.value),
                ManuallyDrop::take(&mut self.on_exit),
            )
        };
        on_exit(value);
    }
}

/// Define an ad-hoc scope guard.
///
/// The code passed to this macro is performed at the end of the scope.
/// It is performed when the scope ends or when a panic passes through.
///
/// # Examples
///
/// ```
/// # use scope_exit::scope_exit;
/// use std::cell::Cell;
/// let x = Cell::new(0);
/// {
///     scope_exit! { x.set(1); }
///     x.set(2);
/// }
/// assert_eq!(x.get(), 1);
/// ```
#[macro_export]
macro_rules! scope_exit
{
    { $($tt:tt)* } => {
        let __scope_exit = $crate::guard((), |()| { $($tt)* });
    };
}
