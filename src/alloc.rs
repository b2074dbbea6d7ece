//! Pluggable node storage.
//!
//! The queue never calls [`std::alloc`] directly. It goes through a
//! [`TypedAlloc`], a typed façade over a [`RawAlloc`]: a cheap, cloneable
//! handle to some byte-allocation backend. Two handles compare equal when
//! and only when they share the same backing storage, so a container can
//! check that a node travels back to the allocator that produced it.
//!
//! [`TypedAlloc::rebind`] produces an adapter for another type over the same
//! backing storage. This is how a queue of `T` obtains an allocator for its
//! internal node type from the element-typed allocator it was given.
use std::alloc::Layout;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::{fmt, ptr};

/// A byte-allocation capability.
///
/// Implementors are handles: cloning must yield a handle to the **same**
/// backing storage, and equality must hold exactly for handles that share
/// backing storage.
pub trait RawAlloc: Clone + PartialEq {
    /// Allocates a block of memory for the given layout.
    /// Returns `None` if the backend cannot satisfy the request.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Returns a block of memory to the backend.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate`](Self::allocate) on a
    /// handle equal to `self`, with the same `layout`, and must not have
    /// been deallocated before.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The process-global byte allocator. A zero-sized handle over [`std::alloc`].
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct Global;

impl RawAlloc for Global {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() > 0, "zero-sized layouts are not supported");

        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

/// The backend could not satisfy an allocation request.
///
/// The operation that surfaced it left no trace: no storage is held, and the
/// caller's state is unchanged.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AllocError;

impl fmt::Debug for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "allocation failed")
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "allocation failed")
    }
}

impl std::error::Error for AllocError {}

/// Represents the possible errors of [`TypedAlloc::try_alloc_new_with`].
pub enum AllocInitErr<E> {
    /// The backend could not satisfy the allocation request.
    Alloc,
    /// The value constructor failed. The storage was already returned to the
    /// allocator when this error was produced.
    Init(E),
}

impl<E: fmt::Debug> fmt::Debug for AllocInitErr<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alloc => write!(f, "allocation failed"),
            Self::Init(err) => write!(f, "initialization failed: {err:?}"),
        }
    }
}

/// A typed façade over a [`RawAlloc`].
///
/// Multiplies counts by `size_of::<T>()` and carries the element alignment,
/// so callers deal in `T`s while the backend deals in bytes.
pub struct TypedAlloc<T, A: RawAlloc = Global> {
    raw: A,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T, A: RawAlloc> TypedAlloc<T, A> {
    /// Wraps the given byte-allocator handle.
    pub fn new(raw: A) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Returns an adapter for `U` over the same backing storage.
    pub fn rebind<U>(&self) -> TypedAlloc<U, A> {
        TypedAlloc::new(self.raw.clone())
    }

    /// Returns the underlying byte-allocator handle.
    pub fn raw(&self) -> &A {
        &self.raw
    }

    /// Allocates storage for `count` values of `T`.
    pub fn allocate(&self, count: usize) -> Result<NonNull<T>, AllocError> {
        let layout = Layout::array::<T>(count).map_err(|_| AllocError)?;

        self.raw.allocate(layout).map(NonNull::cast).ok_or(AllocError)
    }

    /// Returns storage for `count` values of `T` to the backend.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`allocate`](Self::allocate)`(count)` on an equal
    /// adapter and must not have been deallocated before. Values inside are
    /// not dropped.
    pub unsafe fn deallocate(&self, ptr: NonNull<T>, count: usize) {
        // `count` was accepted by `allocate`, so the layout is valid.
        let layout = unsafe { Layout::array::<T>(count).unwrap_unchecked() };

        unsafe { self.raw.deallocate(ptr.cast(), layout) };
    }

    /// Allocates storage for one `T` and moves `value` into it.
    pub fn alloc_new(&self, value: T) -> Result<NonNull<T>, AllocError> {
        let ptr = self.allocate(1)?;

        unsafe { ptr.as_ptr().write(value) };

        Ok(ptr)
    }

    /// Allocates storage for one `T` and fills it with the result of `init`.
    ///
    /// If `init` fails, the storage is returned to the allocator before the
    /// error propagates, so a failed call holds nothing.
    pub fn try_alloc_new_with<E>(
        &self,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<NonNull<T>, AllocInitErr<E>> {
        let ptr = self.allocate(1).map_err(|AllocError| AllocInitErr::Alloc)?;

        match init() {
            Ok(value) => {
                unsafe { ptr.as_ptr().write(value) };

                Ok(ptr)
            }
            Err(err) => {
                unsafe { self.deallocate(ptr, 1) };

                Err(AllocInitErr::Init(err))
            }
        }
    }

    /// Drops the value and returns its storage, pairing
    /// [`alloc_new`](Self::alloc_new) and
    /// [`try_alloc_new_with`](Self::try_alloc_new_with).
    ///
    /// # Safety
    ///
    /// `ptr` must hold a live value allocated by an equal adapter, and must
    /// not be used afterwards.
    pub unsafe fn drop_delete(&self, ptr: NonNull<T>) {
        unsafe {
            ptr::drop_in_place(ptr.as_ptr());
            self.deallocate(ptr, 1);
        }
    }
}

impl<T, A: RawAlloc> Clone for TypedAlloc<T, A> {
    fn clone(&self) -> Self {
        Self::new(self.raw.clone())
    }
}

impl<T, A: RawAlloc + Default> Default for TypedAlloc<T, A> {
    fn default() -> Self {
        Self::new(A::default())
    }
}

impl<T, U, A: RawAlloc> PartialEq<TypedAlloc<U, A>> for TypedAlloc<T, A> {
    fn eq(&self, other: &TypedAlloc<U, A>) -> bool {
        self.raw == other.raw
    }
}

/// An owning handle over a single value allocated from a [`TypedAlloc`].
///
/// Dropping it destroys the value and returns the storage to the allocator
/// it came from.
pub struct AllocBox<T, A: RawAlloc = Global> {
    ptr: NonNull<T>,
    alloc: TypedAlloc<T, A>,
}

impl<T, A: RawAlloc> AllocBox<T, A> {
    /// Allocates storage from `alloc` and moves `value` into it.
    pub fn new_in(value: T, alloc: &TypedAlloc<T, A>) -> Result<Self, AllocError> {
        let ptr = alloc.alloc_new(value)?;

        Ok(Self {
            ptr,
            alloc: alloc.clone(),
        })
    }

    /// Releases ownership of the allocation.
    ///
    /// The caller becomes responsible for routing the pointer back through
    /// [`TypedAlloc::drop_delete`] on an equal adapter.
    pub fn into_raw(self) -> NonNull<T> {
        let this = ManuallyDrop::new(self);

        // The allocator handle is dropped here, the allocation is not.
        drop(unsafe { ptr::read(&this.alloc) });

        this.ptr
    }
}

impl<T, A: RawAlloc> Deref for AllocBox<T, A> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T, A: RawAlloc> DerefMut for AllocBox<T, A> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.ptr.as_mut() }
    }
}

impl<T, A: RawAlloc> Drop for AllocBox<T, A> {
    fn drop(&mut self) {
        unsafe { self.alloc.drop_delete(self.ptr) };
    }
}

impl<T: fmt::Debug, A: RawAlloc> fmt::Debug for AllocBox<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

unsafe impl<T: Send, A: RawAlloc + Send> Send for AllocBox<T, A> {}
unsafe impl<T: Sync, A: RawAlloc + Sync> Sync for AllocBox<T, A> {}

/// A byte allocator that keeps a registry of live allocations.
///
/// Useful for auditing container ownership: after a container and everything
/// it produced are gone, [`outstanding`](Self::outstanding) must be zero.
/// Clones share the registry.
#[derive(Clone)]
pub struct CountingAlloc {
    registry: Arc<Mutex<HashMap<usize, Layout>>>,
}

impl CountingAlloc {
    /// Creates an allocator with an empty registry.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the number of live allocations.
    pub fn outstanding(&self) -> usize {
        self.registry().len()
    }

    /// Returns the layout recorded for `ptr`, if it is a live allocation.
    pub fn find(&self, ptr: NonNull<u8>) -> Option<Layout> {
        self.registry().get(&(ptr.as_ptr() as usize)).copied()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<usize, Layout>> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CountingAlloc {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CountingAlloc {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.registry, &other.registry)
    }
}

impl Eq for CountingAlloc {}

impl fmt::Debug for CountingAlloc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingAlloc")
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl RawAlloc for CountingAlloc {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = Global.allocate(layout)?;

        self.registry().insert(ptr.as_ptr() as usize, layout);

        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        let recorded = self.registry().remove(&(ptr.as_ptr() as usize));

        debug_assert_eq!(
            recorded,
            Some(layout),
            "deallocated a pointer this allocator does not own"
        );

        unsafe { Global.deallocate(ptr, layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_alloc_tracks_outstanding() {
        let counting = CountingAlloc::new();
        let alloc = TypedAlloc::<u64, _>::new(counting.clone());

        let a = alloc.allocate(1).unwrap();
        let b = alloc.allocate(4).unwrap();

        assert_eq!(counting.outstanding(), 2);
        assert_eq!(counting.find(a.cast()), Some(Layout::array::<u64>(1).unwrap()));
        assert_eq!(counting.find(b.cast()), Some(Layout::array::<u64>(4).unwrap()));

        unsafe {
            alloc.deallocate(a, 1);
            alloc.deallocate(b, 4);
        }

        assert_eq!(counting.outstanding(), 0);
        assert_eq!(counting.find(a.cast()), None);
    }

    #[test]
    fn test_rebind_shares_backing() {
        let counting = CountingAlloc::new();
        let for_u64 = TypedAlloc::<u64, _>::new(counting.clone());
        let for_u32 = for_u64.rebind::<u32>();

        assert!(for_u64 == for_u32);
        assert!(for_u32.raw() == &counting);

        let other = TypedAlloc::<u64, _>::new(CountingAlloc::new());

        assert!(for_u64 != other);

        // `Global` handles are all the same backing storage.
        assert!(TypedAlloc::<u64>::default() == TypedAlloc::<u32>::default().rebind::<i8>());
    }

    #[test]
    fn test_alloc_new_then_drop_delete() {
        let counting = CountingAlloc::new();
        let alloc = TypedAlloc::<String, _>::new(counting.clone());

        let ptr = alloc.alloc_new(String::from("payload")).unwrap();

        assert_eq!(counting.outstanding(), 1);
        assert_eq!(unsafe { ptr.as_ref() }, "payload");

        unsafe { alloc.drop_delete(ptr) };

        assert_eq!(counting.outstanding(), 0);
    }

    #[test]
    fn test_failed_init_returns_storage() {
        let counting = CountingAlloc::new();
        let alloc = TypedAlloc::<String, _>::new(counting.clone());

        let res = alloc.try_alloc_new_with(|| Err::<String, _>("nope"));

        assert!(matches!(res, Err(AllocInitErr::Init("nope"))));
        assert_eq!(counting.outstanding(), 0);

        let ptr = alloc
            .try_alloc_new_with(|| Ok::<_, ()>(String::from("fine")))
            .unwrap();

        assert_eq!(counting.outstanding(), 1);

        unsafe { alloc.drop_delete(ptr) };

        assert_eq!(counting.outstanding(), 0);
    }

    #[test]
    fn test_alloc_box_owns_its_value() {
        let counting = CountingAlloc::new();
        let alloc = TypedAlloc::<Vec<i32>, _>::new(counting.clone());

        {
            let mut boxed = AllocBox::new_in(vec![1, 2], &alloc).unwrap();

            boxed.push(3);

            assert_eq!(*boxed, [1, 2, 3]);
            assert_eq!(counting.outstanding(), 1);
        }

        assert_eq!(counting.outstanding(), 0);

        let boxed = AllocBox::new_in(vec![7], &alloc).unwrap();
        let raw = boxed.into_raw();

        assert_eq!(counting.outstanding(), 1);

        unsafe { alloc.drop_delete(raw) };

        assert_eq!(counting.outstanding(), 0);
    }
}
