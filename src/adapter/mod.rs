//! Type-Erased List Adapter
//!
//! Bridges the fan-out aggregator, which never names a concrete resource
//! kind, and the per-cluster handles, which must fill a concrete container.
//!
//! ```text
//!   caller ── ListSpec ──► GlobalClient ──► ClusterHandle::list(&mut dyn ObjectContainer)
//!     ▲                        │                         │
//!     │                        │          Vec<DynamicObject> ──► fill()
//!     └── ClusterObject<T> ◄── extract(&Container) ◄─────┘
//! ```
//!
//! Three list specs are provided:
//! - [`TypedList`]: any statically typed `kube::Resource` (e.g. `Pod`)
//! - [`DynamicList`]: kinds only known at runtime through an `ApiResource`
//! - [`AdaptedList`]: a container factory paired with a caller-written
//!   extraction callback, for everything else

pub mod container;
pub mod list;

pub use container::*;
pub use list::*;
