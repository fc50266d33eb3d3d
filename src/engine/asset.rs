// Bird model import.
// Reads the first mesh primitive of a glTF/GLB file together with its morph
// targets and the length of its first animation. Everything here runs once
// at startup; any failure is fatal.

use std::path::Path;

use super::animation::MorphAnimation;
use super::error::AssetError;

/// Base geometry of a single bird plus its wing-beat animation.
#[derive(Debug, Clone)]
pub struct BirdModel {
    pub positions: Vec<[f32; 3]>,
    pub colors:    Vec<[f32; 3]>,
    pub indices:   Vec<u32>,
    pub animation: MorphAnimation,
}

impl BirdModel {
    /// Assemble a model, checking index range and morph target sizes.
    ///
    /// Colors default to white when absent and indices to the identity
    /// order when the primitive is not indexed.
    pub fn new(
        positions: Vec<[f32; 3]>,
        colors: Option<Vec<[f32; 3]>>,
        indices: Option<Vec<u32>>,
        animation: MorphAnimation,
    ) -> Result<Self, AssetError> {
        if positions.is_empty() {
            return Err(AssetError::NoPositions);
        }
        if animation.targets.is_empty() {
            return Err(AssetError::NoMorphTargets);
        }
        if !(animation.duration.is_finite() && animation.duration > 0.0) {
            return Err(AssetError::NoAnimation);
        }
        let vertex_count = positions.len();
        for (target, deltas) in animation.targets.iter().enumerate() {
            if deltas.len() > vertex_count {
                return Err(AssetError::MorphTargetMismatch {
                    target,
                    found: deltas.len(),
                    expected: vertex_count,
                });
            }
        }

        let colors = match colors {
            Some(colors) if colors.len() == vertex_count => colors,
            Some(colors) => {
                log::warn!(
                    "model has {} colors for {} vertices; using white",
                    colors.len(),
                    vertex_count
                );
                vec![[1.0; 3]; vertex_count]
            }
            None => {
                log::warn!("model has no vertex colors; using white");
                vec![[1.0; 3]; vertex_count]
            }
        };

        let indices = indices.unwrap_or_else(|| (0..vertex_count as u32).collect());
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(AssetError::IndexOutOfRange { index, vertex_count });
        }

        Ok(Self { positions, colors, indices, animation })
    }

    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// Import the bird from a glTF or GLB file.
pub fn load_bird(path: &Path) -> Result<BirdModel, AssetError> {
    let (doc, buffers, _images) = gltf::import(path).map_err(|source| AssetError::Import {
        path: path.display().to_string(),
        source,
    })?;
    let get_buffer = |b: gltf::Buffer| buffers.get(b.index()).map(|data| data.0.as_slice());

    let prim = doc
        .meshes()
        .flat_map(|mesh| mesh.primitives())
        .next()
        .ok_or(AssetError::NoMesh)?;
    let reader = prim.reader(get_buffer);

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or(AssetError::NoPositions)?
        .collect();
    let colors = reader.read_colors(0).map(|c| c.into_rgb_f32().collect());
    let indices = reader.read_indices().map(|i| i.into_u32().collect());
    let targets: Vec<Vec<[f32; 3]>> = reader
        .read_morph_targets()
        .map(|(deltas, _normals, _tangents)| deltas.map(|d| d.collect()).unwrap_or_default())
        .collect();

    let clip = doc.animations().next().ok_or(AssetError::NoAnimation)?;
    let duration = clip
        .channels()
        .filter_map(|channel| channel.reader(get_buffer).read_inputs())
        .flatten()
        .fold(0.0f32, f32::max);

    let model = BirdModel::new(positions, colors, indices, MorphAnimation { targets, duration })?;
    log::info!(
        "loaded {}: {} vertices, {} indices, {} morph targets, {:.2}s clip",
        path.display(),
        model.vertex_count(),
        model.index_count(),
        model.animation.targets.len(),
        model.animation.duration
    );
    Ok(model)
}
