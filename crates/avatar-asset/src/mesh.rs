#[derive(Debug, Clone, PartialEq)]
pub struct MeshAsset {
    pub name: Option<String>,
    pub primitive_count: usize,
    pub skinned: bool,
}

impl MeshAsset {
    pub fn new(name: impl Into<String>, primitive_count: usize, skinned: bool) -> Self {
        Self {
            name: Some(name.into()),
            primitive_count,
            skinned,
        }
    }
}
