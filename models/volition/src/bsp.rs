use byteorder::{
	LE,
	ReadBytesExt,
	WriteBytesExt
};

use std::io::{
	self,
	ErrorKind
};

use ultraviolet::vec::{
	Vec2,
	Vec3
};

use pofkit_core::io_ext::{
	ReadBinExt,
	WriteBinExt
};

use crate::mesh::{
	bounds,
	vec3_bits,
	Face,
	Mesh
};

pub const OP_EOF: u32 = 0;
pub const OP_DEFPOINTS: u32 = 1;
pub const OP_FLATPOLY: u32 = 2;
pub const OP_TMAPPOLY: u32 = 3;
pub const OP_SORTNORM: u32 = 4;
pub const OP_BOUNDBOX: u32 = 5;

/// Fixed record lengths, header included
const EOF_SIZE: u32 = 8;
const BOUNDBOX_SIZE: u32 = 32;
const SORTNORM_SIZE: u32 = 80;

/// Tolerance when classifying a face center against a splitting plane
pub const PLANE_EPSILON: f32 = 1e-4;

/// Collision tree over the faces of one sub-model mesh. Face payloads are
/// indices into the source mesh's face table.
#[derive(Clone, Debug, PartialEq)]
pub enum BspNode {
	Leaf {
		faces: Vec<usize>,
	},
	Split {
		normal: Vec3,
		point: Vec3,
		/// Faces lying in the splitting plane stop at this node
		coincident: Vec<usize>,
		front: Box<BspNode>,
		back: Box<BspNode>,
	},
}

impl BspNode {
	pub fn is_empty(&self) -> bool {
		match self {
			BspNode::Leaf { faces } => faces.is_empty(),
			BspNode::Split { .. } => false,
		}
	}

	fn collect_faces(&self, out: &mut Vec<usize>) {
		match self {
			BspNode::Leaf { faces } => out.extend_from_slice(faces),
			BspNode::Split { coincident, front, back, .. } => {
				out.extend_from_slice(coincident);
				front.collect_faces(out);
				back.collect_faces(out);
			},
		}
	}
}

/// Builds a collision tree for the mesh. The first remaining face supplies
/// the splitting plane; the rest partition by the signed distance of their
/// center to it. A single face or an empty face set is already a leaf.
#[cfg(feature = "export")]
pub fn build(mesh: &Mesh) -> BspNode {
	build_node(mesh, (0..mesh.faces.len()).collect())
}

#[cfg(feature = "export")]
fn build_node(mesh: &Mesh, faces: Vec<usize>) -> BspNode {
	if faces.len() <= 1 {
		return BspNode::Leaf {
			faces: faces,
		};
	}

	let normal = mesh.faces[faces[0]].normal;
	let point = mesh.faces[faces[0]].center;

	let mut front = vec![];
	let mut back = vec![];
	let mut coincident = vec![];

	for i in faces {
		let dist = (mesh.faces[i].center - point).dot(normal);
		if dist > PLANE_EPSILON {
			front.push(i);
		} else if dist < -PLANE_EPSILON {
			back.push(i);
		} else {
			coincident.push(i);
		}
	}

	if front.is_empty() && back.is_empty() {
		return BspNode::Leaf {
			faces: coincident,
		};
	}

	BspNode::Split {
		normal: normal,
		point: point,
		coincident: coincident,
		front: Box::new(build_node(mesh, front)),
		back: Box::new(build_node(mesh, back)),
	}
}

/// Serializes the mesh and a freshly built collision tree into the binary
/// geometry buffer embedded in a sub-model chunk.
#[cfg(feature = "export")]
pub fn write_geometry(mesh: &Mesh) -> io::Result<Vec<u8>> {
	let tree = build(mesh);
	let offsets = mesh.norm_offsets();
	let mut buf = vec![];

	write_defpoints(mesh, &mut buf)?;
	write_node(mesh, &offsets, &tree, &mut buf)?;

	Ok(buf)
}

#[cfg(feature = "export")]
fn write_defpoints(mesh: &Mesh, buf: &mut Vec<u8>) -> io::Result<()> {
	let num_verts = mesh.verts.len() as u32;
	let num_norms = mesh.num_norms() as u32;
	let data_offset = 20 + num_verts;
	let size = data_offset + 12 * (num_verts + num_norms);

	buf.write_u32::<LE>(OP_DEFPOINTS)?;
	buf.write_u32::<LE>(size)?;
	buf.write_u32::<LE>(num_verts)?;
	buf.write_u32::<LE>(num_norms)?;
	buf.write_u32::<LE>(data_offset)?;

	for norms in mesh.vert_norms.iter() {
		buf.write_u8(norms.len() as u8)?;
	}

	for (v, norms) in mesh.verts.iter().zip(mesh.vert_norms.iter()) {
		buf.write_vec3_le(*v)?;
		for n in norms.iter() {
			buf.write_vec3_le(*n)?;
		}
	}

	Ok(())
}

#[cfg(feature = "export")]
fn write_node(mesh: &Mesh, offsets: &[usize], node: &BspNode, buf: &mut Vec<u8>) -> io::Result<()> {
	match node {
		BspNode::Leaf { faces } => write_leaf(mesh, offsets, faces, buf),
		BspNode::Split { normal, point, coincident, front, back } => {
			let mut front_buf = vec![];
			let mut back_buf = vec![];
			let mut online_buf = vec![];

			if !front.is_empty() {
				write_node(mesh, offsets, front, &mut front_buf)?;
			}
			if !back.is_empty() {
				write_node(mesh, offsets, back, &mut back_buf)?;
			}
			if !coincident.is_empty() {
				write_leaf(mesh, offsets, coincident, &mut online_buf)?;
			}

			// child offsets are relative to this record's first byte;
			// zero marks an empty branch
			let front_offset = if front_buf.is_empty() {
				0
			} else {
				SORTNORM_SIZE
			};
			let back_offset = if back_buf.is_empty() {
				0
			} else {
				SORTNORM_SIZE + front_buf.len() as u32
			};
			let online_offset = if online_buf.is_empty() {
				0
			} else {
				SORTNORM_SIZE + (front_buf.len() + back_buf.len()) as u32
			};

			let mut subtree = vec![];
			node.collect_faces(&mut subtree);
			let (bbox_min, bbox_max) = face_bounds(mesh, &subtree);

			buf.write_u32::<LE>(OP_SORTNORM)?;
			buf.write_u32::<LE>(SORTNORM_SIZE)?;
			buf.write_vec3_le(*normal)?;
			buf.write_vec3_le(*point)?;
			buf.write_u32::<LE>(0)?; // reserved
			buf.write_u32::<LE>(front_offset)?;
			buf.write_u32::<LE>(back_offset)?;
			buf.write_u32::<LE>(0)?; // prelist
			buf.write_u32::<LE>(0)?; // postlist
			buf.write_u32::<LE>(online_offset)?;
			buf.write_vec3_le(bbox_min)?;
			buf.write_vec3_le(bbox_max)?;

			buf.extend_from_slice(&front_buf);
			buf.extend_from_slice(&back_buf);
			buf.extend_from_slice(&online_buf);

			Ok(())
		},
	}
}

#[cfg(feature = "export")]
fn write_leaf(mesh: &Mesh, offsets: &[usize], faces: &[usize], buf: &mut Vec<u8>) -> io::Result<()> {
	if faces.is_empty() {
		buf.write_u32::<LE>(OP_EOF)?;
		return buf.write_u32::<LE>(EOF_SIZE);
	}

	let (bbox_min, bbox_max) = face_bounds(mesh, faces);

	buf.write_u32::<LE>(OP_BOUNDBOX)?;
	buf.write_u32::<LE>(BOUNDBOX_SIZE)?;
	buf.write_vec3_le(bbox_min)?;
	buf.write_vec3_le(bbox_max)?;

	for i in faces.iter() {
		write_polygon(mesh, offsets, &mesh.faces[*i], buf)?;
	}

	buf.write_u32::<LE>(OP_EOF)?;
	buf.write_u32::<LE>(EOF_SIZE)
}

#[cfg(feature = "export")]
fn write_polygon(mesh: &Mesh, offsets: &[usize], face: &Face, buf: &mut Vec<u8>) -> io::Result<()> {
	let radius = face.verts.iter()
		.map(|v| (mesh.verts[*v] - face.center).mag())
		.fold(0.0, f32::max);

	match face.texture {
		Some(texture) => {
			let size = 44 + 12 * face.verts.len() as u32;
			buf.write_u32::<LE>(OP_TMAPPOLY)?;
			buf.write_u32::<LE>(size)?;
			buf.write_vec3_le(face.normal)?;
			buf.write_vec3_le(face.center)?;
			buf.write_f32::<LE>(radius)?;
			buf.write_u32::<LE>(face.verts.len() as u32)?;
			buf.write_u32::<LE>(texture)?;

			for (c, (v, n)) in face.verts.iter().zip(face.norms.iter()).enumerate() {
				buf.write_u16::<LE>(*v as u16)?;
				buf.write_u16::<LE>((offsets[*v] + n) as u16)?;
				let uv = match &face.uv {
					Some(uv) => uv[c],
					None => Vec2::zero(),
				};
				buf.write_vec2_le(uv)?;
			}
		},
		None => {
			let size = 44 + 4 * face.verts.len() as u32;
			buf.write_u32::<LE>(OP_FLATPOLY)?;
			buf.write_u32::<LE>(size)?;
			buf.write_vec3_le(face.normal)?;
			buf.write_vec3_le(face.center)?;
			buf.write_f32::<LE>(radius)?;
			buf.write_u32::<LE>(face.verts.len() as u32)?;
			buf.write_u32::<LE>(0)?; // flat color, unused

			for (v, n) in face.verts.iter().zip(face.norms.iter()) {
				buf.write_u16::<LE>(*v as u16)?;
				buf.write_u16::<LE>((offsets[*v] + n) as u16)?;
			}
		},
	}

	Ok(())
}

#[cfg(feature = "export")]
fn face_bounds(mesh: &Mesh, faces: &[usize]) -> (Vec3, Vec3) {
	bounds(faces.iter().flat_map(|f| mesh.faces[*f].verts.iter().map(|v| mesh.verts[*v])))
}

/// Rebuilds a mesh from the binary geometry buffer of a sub-model chunk.
/// The tree shape is not retained; it is a derived artifact rebuilt on the
/// next geometry export.
#[cfg(feature = "import")]
pub fn read_geometry(buf: &[u8]) -> io::Result<Mesh> {
	let mut cur = buf;
	let op = cur.read_u32::<LE>()?;
	if op != OP_DEFPOINTS {
		return Err(malformed("geometry does not start with a vertex table"));
	}

	let size = cur.read_u32::<LE>()?;
	let num_verts = cur.read_u32::<LE>()?;
	let num_norms = cur.read_u32::<LE>()?;
	let data_offset = cur.read_u32::<LE>()?;

	let counts = take(cur, num_verts as usize)?;
	let mut data = seek(buf, data_offset as usize)?;

	let mut mesh = Mesh::default();
	let mut flat_norms = Vec::with_capacity(num_norms as usize);
	for count in counts.iter() {
		mesh.verts.push(data.read_vec3_le()?);
		let mut norms = vec![];
		for _ in 0..*count {
			let n = data.read_vec3_le()?;
			flat_norms.push(n);
			norms.push(n);
		}
		mesh.vert_norms.push(norms);
	}

	if flat_norms.len() != num_norms as usize {
		return Err(malformed("vertex table normal count mismatch"));
	}

	let offsets = mesh.norm_offsets();
	let mut polys = vec![];
	read_node(seek(buf, size as usize)?, &mut polys, 0)?;

	let mut all_textured = true;
	for poly in polys {
		let face = poly_to_face(&mut mesh, &offsets, &flat_norms, poly)?;
		all_textured &= face.texture.is_some();
		mesh.faces.push(face);
	}

	// UV data is all-or-nothing at the mesh level
	if !all_textured {
		for face in mesh.faces.iter_mut() {
			face.uv = None;
		}
	}

	Ok(mesh)
}

#[cfg(feature = "import")]
struct RawPolygon {
	normal: Vec3,
	center: Vec3,
	texture: Option<u32>,
	corners: Vec<(u16, u16, Vec2)>,
}

#[cfg(feature = "import")]
fn read_node(buf: &[u8], polys: &mut Vec<RawPolygon>, depth: u32) -> io::Result<()> {
	if depth > 512 {
		return Err(malformed("collision tree nests too deep"));
	}

	let mut cur = buf;
	let op = cur.read_u32::<LE>()?;
	let size = cur.read_u32::<LE>()?;

	match op {
		OP_EOF => Ok(()),
		OP_SORTNORM => {
			let _normal = cur.read_vec3_le()?;
			let _point = cur.read_vec3_le()?;
			let _reserved = cur.read_u32::<LE>()?;
			let front = cur.read_u32::<LE>()?;
			let back = cur.read_u32::<LE>()?;
			let prelist = cur.read_u32::<LE>()?;
			let postlist = cur.read_u32::<LE>()?;
			let online = cur.read_u32::<LE>()?;

			for offset in [prelist, front, back, online, postlist] {
				if offset != 0 {
					read_node(seek(buf, offset as usize)?, polys, depth + 1)?;
				}
			}

			Ok(())
		},
		OP_BOUNDBOX => {
			let mut rest = seek(buf, size as usize)?;
			loop {
				let mut cur = rest;
				let op = cur.read_u32::<LE>()?;
				let size = cur.read_u32::<LE>()?;

				match op {
					OP_EOF => return Ok(()),
					OP_TMAPPOLY => {
						let normal = cur.read_vec3_le()?;
						let center = cur.read_vec3_le()?;
						let _radius = cur.read_f32::<LE>()?;
						let num_corners = cur.read_u32::<LE>()?;
						let texture = cur.read_u32::<LE>()?;

						let mut corners = vec![];
						for _ in 0..num_corners {
							let v = cur.read_u16::<LE>()?;
							let n = cur.read_u16::<LE>()?;
							corners.push((v, n, cur.read_vec2_le()?));
						}

						polys.push(RawPolygon {
							normal: normal,
							center: center,
							texture: Some(texture),
							corners: corners,
						});
					},
					OP_FLATPOLY => {
						let normal = cur.read_vec3_le()?;
						let center = cur.read_vec3_le()?;
						let _radius = cur.read_f32::<LE>()?;
						let num_corners = cur.read_u32::<LE>()?;
						let _color = cur.read_u32::<LE>()?;

						let mut corners = vec![];
						for _ in 0..num_corners {
							let v = cur.read_u16::<LE>()?;
							let n = cur.read_u16::<LE>()?;
							corners.push((v, n, Vec2::zero()));
						}

						polys.push(RawPolygon {
							normal: normal,
							center: center,
							texture: None,
							corners: corners,
						});
					},
					_ => return Err(malformed("unknown record in collision tree leaf")),
				}

				rest = seek(rest, size as usize)?;
			}
		},
		_ => Err(malformed("unknown record in collision tree")),
	}
}

#[cfg(feature = "import")]
fn poly_to_face(mesh: &mut Mesh, offsets: &[usize], flat_norms: &[Vec3], poly: RawPolygon) -> io::Result<Face> {
	let mut verts = vec![];
	let mut norms = vec![];
	let mut uv = vec![];

	for (v, n, c) in poly.corners {
		let v = v as usize;
		let n = n as usize;
		if v >= mesh.verts.len() || n >= flat_norms.len() {
			return Err(malformed("polygon indexes outside the vertex table"));
		}

		// map the flat normal index back into the corner vertex's own
		// normal list, tolerating foreign producers that pair a corner
		// with another vertex's normal
		let local = if n >= offsets[v] && n - offsets[v] < mesh.vert_norms[v].len() {
			n - offsets[v]
		} else {
			let value = flat_norms[n];
			let vnorms = &mut mesh.vert_norms[v];
			match vnorms.iter().position(|k| vec3_bits(*k) == vec3_bits(value)) {
				Some(i) => i,
				None => {
					vnorms.push(value);
					vnorms.len() - 1
				},
			}
		};

		verts.push(v);
		norms.push(local);
		uv.push(c);
	}

	Ok(Face {
		center: poly.center,
		normal: poly.normal,
		uv: Some(uv),
		texture: poly.texture,
		verts: verts,
		norms: norms,
	})
}

#[cfg(feature = "import")]
fn take(buf: &[u8], len: usize) -> io::Result<&[u8]> {
	buf.get(..len).ok_or_else(|| ErrorKind::UnexpectedEof.into())
}

#[cfg(feature = "import")]
fn seek(buf: &[u8], offset: usize) -> io::Result<&[u8]> {
	buf.get(offset..).ok_or_else(|| ErrorKind::UnexpectedEof.into())
}

#[cfg(feature = "import")]
fn malformed(reason: &str) -> io::Error {
	io::Error::new(ErrorKind::InvalidData, reason.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mesh::{
		CornerData,
		FaceData
	};

	fn tri(points: [Vec3; 3], normal: Vec3, material: Option<&str>) -> FaceData {
		FaceData {
			corners: points.iter().map(|p| CornerData {
				position: *p,
				normal: normal,
				uv: Some(Vec2::new(p.x, p.y)),
			}).collect(),
			normal: normal,
			material: material.map(str::to_string),
		}
	}

	fn z_plane_pair() -> Vec<FaceData> {
		let up = Vec3::new(0., 0., 1.);
		vec![
			tri([Vec3::new(0., 0., 0.), Vec3::new(1., 0., 0.), Vec3::new(0., 1., 0.)], up, Some("hull")),
			tri([Vec3::new(1., 0., 0.), Vec3::new(1., 1., 0.), Vec3::new(0., 1., 0.)], up, Some("hull")),
		]
	}

	#[cfg(feature = "export")]
	#[test]
	fn test_single_face_is_leaf() {
		let up = Vec3::new(0., 0., 1.);
		let mesh = Mesh::build(
			&[tri([Vec3::new(0., 0., 0.), Vec3::new(1., 0., 0.), Vec3::new(0., 1., 0.)], up, None)],
			&[],
			false,
		).unwrap();

		assert_eq!(BspNode::Leaf { faces: vec![0] }, build(&mesh));
	}

	#[cfg(feature = "export")]
	#[test]
	fn test_empty_mesh_is_leaf() {
		let mesh = Mesh::default();
		assert!(build(&mesh).is_empty());
	}

	#[cfg(feature = "export")]
	#[test]
	fn test_coplanar_faces_stay_together() {
		let mesh = Mesh::build(&z_plane_pair(), &["hull".to_string()], false).unwrap();
		assert_eq!(BspNode::Leaf { faces: vec![0, 1] }, build(&mesh));
	}

	#[cfg(feature = "export")]
	#[test]
	fn test_parallel_faces_split() {
		let up = Vec3::new(0., 0., 1.);
		let low = tri([Vec3::new(0., 0., 0.), Vec3::new(1., 0., 0.), Vec3::new(0., 1., 0.)], up, None);
		let high = tri([Vec3::new(0., 0., 2.), Vec3::new(1., 0., 2.), Vec3::new(0., 1., 2.)], up, None);
		let mesh = Mesh::build(&[low, high], &[], false).unwrap();

		match build(&mesh) {
			BspNode::Split { coincident, front, back, .. } => {
				assert_eq!(vec![0], coincident);
				assert_eq!(BspNode::Leaf { faces: vec![1] }, *front);
				assert!(back.is_empty());
			},
			leaf => panic!("expected a split, got {:?}", leaf),
		}
	}

	#[cfg(all(feature = "import", feature = "export"))]
	#[test]
	fn test_geometry_round_trip() {
		let mesh = Mesh::build(&z_plane_pair(), &["hull".to_string()], false).unwrap();
		let buf = write_geometry(&mesh).unwrap();

		assert_eq!(mesh, read_geometry(&buf).unwrap());
	}

	#[cfg(all(feature = "import", feature = "export"))]
	#[test]
	fn test_untextured_geometry_round_trip() {
		let up = Vec3::new(0., 0., 1.);
		let faces = vec![
			tri([Vec3::new(0., 0., 0.), Vec3::new(1., 0., 0.), Vec3::new(0., 1., 0.)], up, None),
			tri([Vec3::new(1., 0., 0.), Vec3::new(1., 1., 0.), Vec3::new(0., 1., 0.)], up, None),
		];
		let mesh = Mesh::build(&faces, &[], false).unwrap();
		let decoded = read_geometry(&write_geometry(&mesh).unwrap()).unwrap();

		// FLATPOLY records carry no UV data, and the source had none
		assert_eq!(mesh, decoded);
	}

	#[cfg(all(feature = "import", feature = "export"))]
	#[test]
	fn test_split_geometry_keeps_all_faces() {
		let up = Vec3::new(0., 0., 1.);
		let mut faces = vec![];
		for layer in 0..4 {
			let z = layer as f32;
			faces.push(tri([Vec3::new(0., 0., z), Vec3::new(1., 0., z), Vec3::new(0., 1., z)], up, Some("hull")));
		}
		let mesh = Mesh::build(&faces, &["hull".to_string()], false).unwrap();

		let decoded = read_geometry(&write_geometry(&mesh).unwrap()).unwrap();
		assert_eq!(mesh.verts, decoded.verts);
		assert_eq!(mesh.vert_norms, decoded.vert_norms);
		assert_eq!(mesh.faces.len(), decoded.faces.len());
		for face in mesh.faces.iter() {
			assert!(decoded.faces.contains(face), "face {:?} lost by the tree", face);
		}
	}
}
