/// GLTF, GLB and VRM loader with `gltf` crate.
#[cfg(feature = "gltf")]
pub mod gltf;
