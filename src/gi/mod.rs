//! Hybrid GI: the CPU acceleration structure and the ambient-probe baker.

pub mod accel;
pub mod baker;
pub mod bvh;
pub mod packing;
pub mod probe;
pub mod structure;

pub use accel::{ShadowMapBake, TraceContext, TraceHit};
pub use baker::{BakeEnvironment, BakerKind, CubeProc, GroupRecord, ProbeBaker};
pub use bvh::{Aabb, Bvh, Triangle};
pub use probe::{AmbientCube, CubeGrid, GridConfig};
pub use structure::CpuAccelerationStructure;
