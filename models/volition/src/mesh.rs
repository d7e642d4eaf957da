#[cfg(feature = "export")]
use std::collections::HashMap;

use ultraviolet::vec::{
	Vec2,
	Vec3
};

#[cfg(feature = "export")]
use crate::pof::PofExportError;

/// One corner of a source polygon, before deduplication
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CornerData {
	pub position: Vec3,
	pub normal: Vec3,
	pub uv: Option<Vec2>,
}

/// One polygon as handed over by the host editor, corners in ring order
#[derive(Clone, Debug, PartialEq)]
pub struct FaceData {
	pub corners: Vec<CornerData>,
	pub normal: Vec3,
	pub material: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Face {
	/// Indices into [`Mesh::verts`], ring order as given by the source
	pub verts: Vec<usize>,
	/// Parallel to `verts`; each entry indexes the owning vertex's own
	/// normal list in [`Mesh::vert_norms`]
	pub norms: Vec<usize>,
	pub uv: Option<Vec<Vec2>>,
	pub texture: Option<u32>,
	pub center: Vec3,
	pub normal: Vec3,
}

/// Deduplicated, indexed polygon mesh of one sub-model
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
	pub verts: Vec<Vec3>,
	/// Parallel to `verts`; a vertex keeps one entry per split normal
	pub vert_norms: Vec<Vec<Vec3>>,
	pub faces: Vec<Face>,
}

impl Mesh {
	pub fn num_norms(&self) -> usize {
		self.vert_norms.iter().map(Vec::len).sum()
	}

	/// Returns, per vertex, the index its first normal takes in the flat
	/// normal table the binary geometry uses
	pub fn norm_offsets(&self) -> Vec<usize> {
		let mut offsets = Vec::with_capacity(self.vert_norms.len());
		let mut total = 0;

		for norms in self.vert_norms.iter() {
			offsets.push(total);
			total += norms.len();
		}

		offsets
	}

	/// Swaps the second and third axis of every position, normal and
	/// centroid, and mirrors the V texture coordinate where UVs exist.
	/// Applying it twice restores the mesh.
	pub fn flip_axes(&mut self) {
		for v in self.verts.iter_mut() {
			*v = flip_vec3(*v);
		}

		for norms in self.vert_norms.iter_mut() {
			for n in norms.iter_mut() {
				*n = flip_vec3(*n);
			}
		}

		for face in self.faces.iter_mut() {
			face.center = flip_vec3(face.center);
			face.normal = flip_vec3(face.normal);
			if let Some(uv) = &mut face.uv {
				for c in uv.iter_mut() {
					c.y = -c.y;
				}
			}
		}
	}

	pub fn bounds(&self) -> (Vec3, Vec3) {
		bounds(self.verts.iter().copied())
	}

	/// Builds an indexed mesh from raw polygon soup. Corner positions are
	/// deduplicated by exact coordinate equality; each corner normal is
	/// deduplicated within its own vertex's normal list. Ring order is
	/// preserved. UV data is kept only when every corner of every face
	/// carries it.
	#[cfg(feature = "export")]
	pub fn build(faces: &[FaceData], textures: &[String], flip_axes: bool) -> Result<Mesh, PofExportError> {
		for face in faces.iter() {
			if face.corners.len() < 3 || face.corners.len() > 4 {
				return Err(PofExportError::MeshTopology(face.corners.len()));
			}
		}

		let mut mesh = Mesh::default();
		let mut vert_lookup: HashMap<[u32; 3], usize> = HashMap::new();
		let mut has_uv = true;

		for face in faces.iter() {
			let mut verts = vec![];
			let mut norms = vec![];
			let mut uv = vec![];
			let mut center = Vec3::zero();

			for corner in face.corners.iter() {
				let key = vec3_bits(corner.position);
				let vi = match vert_lookup.get(&key) {
					Some(i) => *i,
					None => {
						mesh.verts.push(corner.position);
						mesh.vert_norms.push(vec![]);
						vert_lookup.insert(key, mesh.verts.len() - 1);
						mesh.verts.len() - 1
					},
				};

				let vnorms = &mut mesh.vert_norms[vi];
				let ni = match vnorms.iter().position(|n| vec3_bits(*n) == vec3_bits(corner.normal)) {
					Some(i) => i,
					None => {
						vnorms.push(corner.normal);
						vnorms.len() - 1
					},
				};

				verts.push(vi);
				norms.push(ni);
				center += corner.position;

				match corner.uv {
					Some(c) => uv.push(c),
					None => has_uv = false,
				}
			}

			let texture = match &face.material {
				Some(name) => match textures.iter().position(|t| t == name) {
					Some(i) => Some(i as u32),
					None => return Err(PofExportError::UnknownTexture(name.clone())),
				},
				None => None,
			};

			mesh.faces.push(Face {
				center: center / (face.corners.len() as f32),
				normal: face.normal,
				texture: texture,
				uv: Some(uv),
				verts: verts,
				norms: norms,
			});
		}

		if !has_uv {
			for face in mesh.faces.iter_mut() {
				face.uv = None;
			}
		}

		if flip_axes {
			mesh.flip_axes();
		}

		Ok(mesh)
	}
}

pub(crate) fn vec3_bits(v: Vec3) -> [u32; 3] {
	[v.x.to_bits(), v.y.to_bits(), v.z.to_bits()]
}

pub(crate) fn flip_vec3(v: Vec3) -> Vec3 {
	Vec3::new(v.x, v.z, v.y)
}

pub(crate) fn bounds<I>(verts: I) -> (Vec3, Vec3)
where
	I: Iterator<Item = Vec3>,
{
	let mut min = Vec3::broadcast(f32::MAX);
	let mut max = Vec3::broadcast(f32::MIN);
	let mut any = false;

	for v in verts {
		min = min.min_by_component(v);
		max = max.max_by_component(v);
		any = true;
	}

	if any {
		(min, max)
	} else {
		(Vec3::zero(), Vec3::zero())
	}
}
