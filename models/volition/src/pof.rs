use bitflags::bitflags;

use byteorder::{
	LE,
	ReadBytesExt,
	WriteBytesExt
};

#[cfg(feature = "export")]
use std::collections::HashMap;

use std::io::{
	self,
	ErrorKind
};

use thiserror::Error;

use ultraviolet::vec::Vec3;

use pofkit_core::{
	io_ext::{
		ReadBinExt,
		WriteBinExt
	},
	rtag4,
	untag4
};

#[cfg(any(feature = "import", feature = "export"))]
use crate::bsp;

use crate::mesh::Mesh;

pub const SIGNATURE: u32 = rtag4!(b"PSPO");
pub const VERSION: i32 = 2117;

pub const ID_HDR2: u32 = rtag4!(b"HDR2");
pub const ID_OBJ2: u32 = rtag4!(b"OBJ2");
pub const ID_TXTR: u32 = rtag4!(b"TXTR");
pub const ID_EYE: u32 = rtag4!(b"EYE ");
pub const ID_SHLD: u32 = rtag4!(b"SHLD");
pub const ID_ACEN: u32 = rtag4!(b"ACEN");
pub const ID_GPNT: u32 = rtag4!(b"GPNT");
pub const ID_MPNT: u32 = rtag4!(b"MPNT");
pub const ID_TGUN: u32 = rtag4!(b"TGUN");
pub const ID_TMIS: u32 = rtag4!(b"TMIS");
pub const ID_DOCK: u32 = rtag4!(b"DOCK");
pub const ID_GLOW: u32 = rtag4!(b"GLOW");
pub const ID_FUEL: u32 = rtag4!(b"FUEL");
pub const ID_SPCL: u32 = rtag4!(b"SPCL");
pub const ID_PATH: u32 = rtag4!(b"PATH");

bitflags! {
	/// Chunk categories a partial import/export may select
	pub struct Categories: u32 {
		const HEADER = 1;
		const TEXTURES = 1 << 1;
		const SUB_MODELS = 1 << 2;
		const EYES = 1 << 3;
		const SHIELD = 1 << 4;
		const AUTO_CENTER = 1 << 5;
		const GUN_POINTS = 1 << 6;
		const MISSILE_POINTS = 1 << 7;
		const TURRET_GUNS = 1 << 8;
		const TURRET_MISSILES = 1 << 9;
		const DOCKS = 1 << 10;
		const GLOWS = 1 << 11;
		const THRUSTERS = 1 << 12;
		const SPECIALS = 1 << 13;
		const PATHS = 1 << 14;
	}
}

/// Muzzle flash light in the header's light table
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeaderLight {
	pub position: Vec3,
	pub kind: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HeaderChunk {
	pub max_radius: f32,
	pub obj_flags: u32,
	pub num_sub_models: u32,
	pub bbox_min: Vec3,
	pub bbox_max: Vec3,
	/// Sub-model ids, highest detail first
	pub detail_levels: Vec<u32>,
	pub debris: Vec<u32>,
	pub mass: f32,
	pub mass_center: Vec3,
	/// Inertia tensor rows
	pub inertia: [Vec3; 3],
	/// (depth, radius) pairs, may be empty
	pub cross_sections: Vec<(f32, f32)>,
	pub lights: Vec<HeaderLight>,
}

impl HeaderChunk {
	pub const DEFAULT_MASS: f32 = 1000.0;

	/// Recomputes the extent fields from the sub-model chunks that will be
	/// written alongside this header
	#[cfg(feature = "export")]
	pub fn update_extents<'a, I>(&mut self, sub_models: I)
	where
		I: IntoIterator<Item = &'a SubModelChunk>,
	{
		self.num_sub_models = 0;
		self.max_radius = 0.0;
		let mut min = Vec3::broadcast(f32::MAX);
		let mut max = Vec3::broadcast(f32::MIN);

		for sub in sub_models {
			self.num_sub_models += 1;
			let radius = sub.offset.mag() + sub.radius;
			if radius > self.max_radius {
				self.max_radius = radius;
			}
			min = min.min_by_component(sub.offset + sub.bbox_min);
			max = max.max_by_component(sub.offset + sub.bbox_max);
		}

		if self.num_sub_models == 0 {
			min = Vec3::zero();
			max = Vec3::zero();
		}
		self.bbox_min = min;
		self.bbox_max = max;
	}

	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> io::Result<HeaderChunk>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let max_radius = buf.read_f32::<LE>()?;
		let obj_flags = buf.read_u32::<LE>()?;
		let num_sub_models = buf.read_u32::<LE>()?;
		let bbox_min = buf.read_vec3_le()?;
		let bbox_max = buf.read_vec3_le()?;
		let detail_levels = read_ids(buf)?;
		let debris = read_ids(buf)?;
		let mass = buf.read_f32::<LE>()?;
		let mass_center = buf.read_vec3_le()?;
		let inertia = [buf.read_vec3_le()?, buf.read_vec3_le()?, buf.read_vec3_le()?];

		// a missing profile may be stored as a -1 count
		let num_sections = match buf.read_i32::<LE>()? {
			-1 => 0,
			n => n,
		};
		let mut cross_sections = vec![];
		for _ in 0..num_sections {
			cross_sections.push((buf.read_f32::<LE>()?, buf.read_f32::<LE>()?));
		}

		let num_lights = buf.read_u32::<LE>()?;
		let mut lights = vec![];
		for _ in 0..num_lights {
			lights.push(HeaderLight {
				position: buf.read_vec3_le()?,
				kind: buf.read_u32::<LE>()?,
			});
		}

		Ok(HeaderChunk {
			max_radius: max_radius,
			obj_flags: obj_flags,
			num_sub_models: num_sub_models,
			bbox_min: bbox_min,
			bbox_max: bbox_max,
			detail_levels: detail_levels,
			debris: debris,
			mass: mass,
			mass_center: mass_center,
			inertia: inertia,
			cross_sections: cross_sections,
			lights: lights,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt + WriteBinExt,
	{
		buf.write_f32::<LE>(self.max_radius)?;
		buf.write_u32::<LE>(self.obj_flags)?;
		buf.write_u32::<LE>(self.num_sub_models)?;
		buf.write_vec3_le(self.bbox_min)?;
		buf.write_vec3_le(self.bbox_max)?;
		write_ids(&self.detail_levels, buf)?;
		write_ids(&self.debris, buf)?;
		buf.write_f32::<LE>(self.mass)?;
		buf.write_vec3_le(self.mass_center)?;

		for row in self.inertia.iter() {
			buf.write_vec3_le(*row)?;
		}

		buf.write_i32::<LE>(self.cross_sections.len() as i32)?;
		for (depth, radius) in self.cross_sections.iter() {
			buf.write_f32::<LE>(*depth)?;
			buf.write_f32::<LE>(*radius)?;
		}

		buf.write_u32::<LE>(self.lights.len() as u32)?;
		for light in self.lights.iter() {
			buf.write_vec3_le(light.position)?;
			buf.write_u32::<LE>(light.kind)?;
		}

		Ok(())
	}
}

impl Default for HeaderChunk {
	fn default() -> HeaderChunk {
		HeaderChunk {
			max_radius: 0.0,
			obj_flags: 0,
			num_sub_models: 0,
			bbox_min: Vec3::zero(),
			bbox_max: Vec3::zero(),
			detail_levels: vec![],
			debris: vec![],
			mass: HeaderChunk::DEFAULT_MASS,
			mass_center: Vec3::zero(),
			inertia: [Vec3::zero(); 3],
			cross_sections: vec![],
			lights: vec![],
		}
	}
}

/// One named mesh node of the model hierarchy. `geometry` holds the
/// serialized collision/render geometry; an empty buffer marks a
/// metadata-only chunk whose geometry the merge step leaves untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct SubModelChunk {
	pub model_id: u32,
	pub radius: f32,
	pub parent: Option<u32>,
	pub offset: Vec3,
	pub geo_center: Vec3,
	pub bbox_min: Vec3,
	pub bbox_max: Vec3,
	pub name: String,
	/// Free-text engine properties, passed through opaque
	pub properties: String,
	pub movement_type: i32,
	pub movement_axis: i32,
	reserved: i32, // safe to be 0
	pub geometry: Vec<u8>,
}

impl SubModelChunk {
	pub fn new(name: &str) -> SubModelChunk {
		SubModelChunk {
			name: name.to_string(),
			..SubModelChunk::default()
		}
	}

	pub fn is_metadata_only(&self) -> bool {
		self.geometry.is_empty()
	}

	/// Serializes the mesh (and a fresh collision tree) into this chunk and
	/// refreshes the geometry-derived extent fields
	#[cfg(feature = "export")]
	pub fn set_mesh(&mut self, mesh: &Mesh) -> io::Result<()> {
		let (min, max) = mesh.bounds();
		self.bbox_min = min;
		self.bbox_max = max;

		let mut center = Vec3::zero();
		for v in mesh.verts.iter() {
			center += *v;
		}
		if !mesh.verts.is_empty() {
			center /= mesh.verts.len() as f32;
		}
		self.geo_center = center;

		self.radius = mesh.verts.iter().map(|v| v.mag()).fold(0.0, f32::max);
		self.geometry = bsp::write_geometry(mesh)?;

		Ok(())
	}

	/// Decodes the embedded geometry, or `None` for a metadata-only chunk
	#[cfg(feature = "import")]
	pub fn mesh(&self) -> io::Result<Option<Mesh>> {
		if self.geometry.is_empty() {
			Ok(None)
		} else {
			bsp::read_geometry(&self.geometry).map(Some)
		}
	}

	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> io::Result<SubModelChunk>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let model_id = buf.read_u32::<LE>()?;
		let radius = buf.read_f32::<LE>()?;
		let parent = buf.read_i32::<LE>()?;

		Ok(SubModelChunk {
			model_id: model_id,
			radius: radius,
			parent: if parent < 0 {
				None
			} else {
				Some(parent as u32)
			},
			offset: buf.read_vec3_le()?,
			geo_center: buf.read_vec3_le()?,
			bbox_min: buf.read_vec3_le()?,
			bbox_max: buf.read_vec3_le()?,
			name: buf.read_lstr()?,
			properties: buf.read_lstr()?,
			movement_type: buf.read_i32::<LE>()?,
			movement_axis: buf.read_i32::<LE>()?,
			reserved: buf.read_i32::<LE>()?,
			geometry: read_buffer(buf)?,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt + WriteBinExt,
	{
		buf.write_u32::<LE>(self.model_id)?;
		buf.write_f32::<LE>(self.radius)?;
		buf.write_i32::<LE>(match self.parent {
			Some(parent) => parent as i32,
			None => -1,
		})?;
		buf.write_vec3_le(self.offset)?;
		buf.write_vec3_le(self.geo_center)?;
		buf.write_vec3_le(self.bbox_min)?;
		buf.write_vec3_le(self.bbox_max)?;
		buf.write_lstr(&self.name)?;
		buf.write_lstr(&self.properties)?;
		buf.write_i32::<LE>(self.movement_type)?;
		buf.write_i32::<LE>(self.movement_axis)?;
		buf.write_i32::<LE>(self.reserved)?;
		buf.write_u32::<LE>(self.geometry.len() as u32)?;
		buf.write_all(&self.geometry)?;

		Ok(())
	}
}

impl Default for SubModelChunk {
	fn default() -> SubModelChunk {
		SubModelChunk {
			model_id: 0,
			radius: 0.0,
			parent: None,
			offset: Vec3::zero(),
			geo_center: Vec3::zero(),
			bbox_min: Vec3::zero(),
			bbox_max: Vec3::zero(),
			name: String::new(),
			properties: String::new(),
			movement_type: -1,
			movement_axis: -1,
			reserved: 0,
			geometry: vec![],
		}
	}
}

/// Texture name list; face texture indices in sub-model geometry index
/// into it
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextureChunk {
	pub textures: Vec<String>,
}

impl TextureChunk {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> io::Result<TextureChunk>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let num = buf.read_u32::<LE>()?;
		let mut textures = vec![];
		for _ in 0..num {
			textures.push(buf.read_lstr()?);
		}

		Ok(TextureChunk {
			textures: textures,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt + WriteBinExt,
	{
		buf.write_u32::<LE>(self.textures.len() as u32)?;
		for texture in self.textures.iter() {
			buf.write_lstr(texture)?;
		}

		Ok(())
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EyePoint {
	pub sub_model: u32,
	pub offset: Vec3,
	pub normal: Vec3,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EyeChunk {
	pub points: Vec<EyePoint>,
}

impl EyeChunk {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> io::Result<EyeChunk>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let num = buf.read_u32::<LE>()?;
		let mut points = vec![];
		for _ in 0..num {
			points.push(EyePoint {
				sub_model: buf.read_u32::<LE>()?,
				offset: buf.read_vec3_le()?,
				normal: buf.read_vec3_le()?,
			});
		}

		Ok(EyeChunk {
			points: points,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt + WriteBinExt,
	{
		buf.write_u32::<LE>(self.points.len() as u32)?;
		for point in self.points.iter() {
			buf.write_u32::<LE>(point.sub_model)?;
			buf.write_vec3_le(point.offset)?;
			buf.write_vec3_le(point.normal)?;
		}

		Ok(())
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShieldFace {
	pub normal: Vec3,
	pub verts: [u32; 3],
	/// Faces sharing each edge; an unshared edge points back at the face
	pub neighbors: [u32; 3],
}

/// Coarse triangle-only collision mesh, no textures or UVs
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShieldChunk {
	pub verts: Vec<Vec3>,
	pub faces: Vec<ShieldFace>,
}

impl ShieldChunk {
	#[cfg(feature = "export")]
	pub fn from_mesh(mesh: &Mesh) -> Result<ShieldChunk, PofExportError> {
		let mut edges: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
		let mut faces = vec![];

		for (i, face) in mesh.faces.iter().enumerate() {
			if face.verts.len() != 3 {
				return Err(PofExportError::MeshTopology(face.verts.len()));
			}

			let verts = [face.verts[0] as u32, face.verts[1] as u32, face.verts[2] as u32];
			for e in 0..3 {
				edges.entry(edge_key(verts[e], verts[(e + 1) % 3])).or_default().push(i);
			}

			faces.push(ShieldFace {
				normal: face.normal,
				verts: verts,
				neighbors: [0; 3],
			});
		}

		for (i, face) in faces.iter_mut().enumerate() {
			for e in 0..3 {
				let shared = &edges[&edge_key(face.verts[e], face.verts[(e + 1) % 3])];
				face.neighbors[e] = match shared.iter().find(|j| **j != i) {
					Some(j) => *j as u32,
					None => i as u32,
				};
			}
		}

		Ok(ShieldChunk {
			verts: mesh.verts.clone(),
			faces: faces,
		})
	}

	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> io::Result<ShieldChunk>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let num_verts = buf.read_u32::<LE>()?;
		let mut verts = vec![];
		for _ in 0..num_verts {
			verts.push(buf.read_vec3_le()?);
		}

		let num_faces = buf.read_u32::<LE>()?;
		let mut faces = vec![];
		for _ in 0..num_faces {
			faces.push(ShieldFace {
				normal: buf.read_vec3_le()?,
				verts: [buf.read_u32::<LE>()?, buf.read_u32::<LE>()?, buf.read_u32::<LE>()?],
				neighbors: [buf.read_u32::<LE>()?, buf.read_u32::<LE>()?, buf.read_u32::<LE>()?],
			});
		}

		Ok(ShieldChunk {
			verts: verts,
			faces: faces,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt + WriteBinExt,
	{
		buf.write_u32::<LE>(self.verts.len() as u32)?;
		for v in self.verts.iter() {
			buf.write_vec3_le(*v)?;
		}

		buf.write_u32::<LE>(self.faces.len() as u32)?;
		for face in self.faces.iter() {
			buf.write_vec3_le(face.normal)?;
			for v in face.verts.iter() {
				buf.write_u32::<LE>(*v)?;
			}
			for n in face.neighbors.iter() {
				buf.write_u32::<LE>(*n)?;
			}
		}

		Ok(())
	}
}

#[cfg(feature = "export")]
fn edge_key(a: u32, b: u32) -> (u32, u32) {
	if a < b {
		(a, b)
	} else {
		(b, a)
	}
}

/// Autocenter point used by the engine's tech room
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutoCenterChunk {
	pub point: Vec3,
}

impl AutoCenterChunk {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> io::Result<AutoCenterChunk>
	where
		R: ReadBinExt,
	{
		Ok(AutoCenterChunk {
			point: buf.read_vec3_le()?,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBinExt,
	{
		buf.write_vec3_le(self.point)
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeaponPoint {
	pub position: Vec3,
	pub normal: Vec3,
}

/// Points of one gun or missile mount
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeaponBank {
	pub points: Vec<WeaponPoint>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeaponPointsChunk {
	pub banks: Vec<WeaponBank>,
}

impl WeaponPointsChunk {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> io::Result<WeaponPointsChunk>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let num_banks = buf.read_u32::<LE>()?;
		let mut banks = vec![];
		for _ in 0..num_banks {
			let num_points = buf.read_u32::<LE>()?;
			let mut points = vec![];
			for _ in 0..num_points {
				points.push(WeaponPoint {
					position: buf.read_vec3_le()?,
					normal: buf.read_vec3_le()?,
				});
			}
			banks.push(WeaponBank {
				points: points,
			});
		}

		Ok(WeaponPointsChunk {
			banks: banks,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt + WriteBinExt,
	{
		buf.write_u32::<LE>(self.banks.len() as u32)?;
		for bank in self.banks.iter() {
			buf.write_u32::<LE>(bank.points.len() as u32)?;
			for point in bank.points.iter() {
				buf.write_vec3_le(point.position)?;
				buf.write_vec3_le(point.normal)?;
			}
		}

		Ok(())
	}
}

/// One turret: the sub-model carrying the base, the sub-model carrying the
/// barrels, and the firing points on it
#[derive(Clone, Debug, PartialEq)]
pub struct TurretBank {
	pub base: u32,
	pub arm: u32,
	pub normal: Vec3,
	pub fire_points: Vec<Vec3>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurretChunk {
	pub banks: Vec<TurretBank>,
}

impl TurretChunk {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> io::Result<TurretChunk>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let num_banks = buf.read_u32::<LE>()?;
		let mut banks = vec![];
		for _ in 0..num_banks {
			let base = buf.read_u32::<LE>()?;
			let arm = buf.read_u32::<LE>()?;
			let normal = buf.read_vec3_le()?;

			let num_points = buf.read_u32::<LE>()?;
			let mut fire_points = vec![];
			for _ in 0..num_points {
				fire_points.push(buf.read_vec3_le()?);
			}

			banks.push(TurretBank {
				base: base,
				arm: arm,
				normal: normal,
				fire_points: fire_points,
			});
		}

		Ok(TurretChunk {
			banks: banks,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt + WriteBinExt,
	{
		buf.write_u32::<LE>(self.banks.len() as u32)?;
		for bank in self.banks.iter() {
			buf.write_u32::<LE>(bank.base)?;
			buf.write_u32::<LE>(bank.arm)?;
			buf.write_vec3_le(bank.normal)?;
			buf.write_u32::<LE>(bank.fire_points.len() as u32)?;
			for point in bank.fire_points.iter() {
				buf.write_vec3_le(*point)?;
			}
		}

		Ok(())
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DockPoint {
	pub position: Vec3,
	pub normal: Vec3,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DockBay {
	/// Free-text engine properties, passed through opaque
	pub properties: String,
	/// Indices into the path chunk
	pub paths: Vec<u32>,
	pub points: Vec<DockPoint>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DockChunk {
	pub bays: Vec<DockBay>,
}

impl DockChunk {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> io::Result<DockChunk>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let num_bays = buf.read_u32::<LE>()?;
		let mut bays = vec![];
		for _ in 0..num_bays {
			let properties = buf.read_lstr()?;
			let paths = read_ids(buf)?;

			let num_points = buf.read_u32::<LE>()?;
			let mut points = vec![];
			for _ in 0..num_points {
				points.push(DockPoint {
					position: buf.read_vec3_le()?,
					normal: buf.read_vec3_le()?,
				});
			}

			bays.push(DockBay {
				properties: properties,
				paths: paths,
				points: points,
			});
		}

		Ok(DockChunk {
			bays: bays,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt + WriteBinExt,
	{
		buf.write_u32::<LE>(self.bays.len() as u32)?;
		for bay in self.bays.iter() {
			buf.write_lstr(&bay.properties)?;
			write_ids(&bay.paths, buf)?;
			buf.write_u32::<LE>(bay.points.len() as u32)?;
			for point in bay.points.iter() {
				buf.write_vec3_le(point.position)?;
				buf.write_vec3_le(point.normal)?;
			}
		}

		Ok(())
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlowPoint {
	pub position: Vec3,
	pub normal: Vec3,
	pub radius: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GlowBank {
	pub disp_time: i32,
	pub on_time: u32,
	pub off_time: u32,
	pub sub_model: u32,
	pub lod: u32,
	pub kind: u32,
	/// Free-text engine properties, passed through opaque
	pub properties: String,
	pub points: Vec<GlowPoint>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GlowChunk {
	pub banks: Vec<GlowBank>,
}

impl GlowChunk {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> io::Result<GlowChunk>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let num_banks = buf.read_u32::<LE>()?;
		let mut banks = vec![];
		for _ in 0..num_banks {
			let disp_time = buf.read_i32::<LE>()?;
			let on_time = buf.read_u32::<LE>()?;
			let off_time = buf.read_u32::<LE>()?;
			let sub_model = buf.read_u32::<LE>()?;
			let lod = buf.read_u32::<LE>()?;
			let kind = buf.read_u32::<LE>()?;
			// the point count precedes the property text
			let num_points = buf.read_u32::<LE>()?;
			let properties = buf.read_lstr()?;

			let mut points = vec![];
			for _ in 0..num_points {
				points.push(GlowPoint {
					position: buf.read_vec3_le()?,
					normal: buf.read_vec3_le()?,
					radius: buf.read_f32::<LE>()?,
				});
			}

			banks.push(GlowBank {
				disp_time: disp_time,
				on_time: on_time,
				off_time: off_time,
				sub_model: sub_model,
				lod: lod,
				kind: kind,
				properties: properties,
				points: points,
			});
		}

		Ok(GlowChunk {
			banks: banks,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt + WriteBinExt,
	{
		buf.write_u32::<LE>(self.banks.len() as u32)?;
		for bank in self.banks.iter() {
			buf.write_i32::<LE>(bank.disp_time)?;
			buf.write_u32::<LE>(bank.on_time)?;
			buf.write_u32::<LE>(bank.off_time)?;
			buf.write_u32::<LE>(bank.sub_model)?;
			buf.write_u32::<LE>(bank.lod)?;
			buf.write_u32::<LE>(bank.kind)?;
			buf.write_u32::<LE>(bank.points.len() as u32)?;
			buf.write_lstr(&bank.properties)?;
			for point in bank.points.iter() {
				buf.write_vec3_le(point.position)?;
				buf.write_vec3_le(point.normal)?;
				buf.write_f32::<LE>(point.radius)?;
			}
		}

		Ok(())
	}
}

/// One thruster: a set of exhaust glows sharing a mount
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ThrusterBank {
	/// Free-text engine properties, passed through opaque
	pub properties: String,
	pub points: Vec<GlowPoint>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ThrusterChunk {
	pub banks: Vec<ThrusterBank>,
}

impl ThrusterChunk {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> io::Result<ThrusterChunk>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let num_banks = buf.read_u32::<LE>()?;
		let mut banks = vec![];
		for _ in 0..num_banks {
			let num_points = buf.read_u32::<LE>()?;
			let properties = buf.read_lstr()?;

			let mut points = vec![];
			for _ in 0..num_points {
				points.push(GlowPoint {
					position: buf.read_vec3_le()?,
					normal: buf.read_vec3_le()?,
					radius: buf.read_f32::<LE>()?,
				});
			}

			banks.push(ThrusterBank {
				properties: properties,
				points: points,
			});
		}

		Ok(ThrusterChunk {
			banks: banks,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt + WriteBinExt,
	{
		buf.write_u32::<LE>(self.banks.len() as u32)?;
		for bank in self.banks.iter() {
			buf.write_u32::<LE>(bank.points.len() as u32)?;
			buf.write_lstr(&bank.properties)?;
			for point in bank.points.iter() {
				buf.write_vec3_le(point.position)?;
				buf.write_vec3_le(point.normal)?;
				buf.write_f32::<LE>(point.radius)?;
			}
		}

		Ok(())
	}
}

/// Named marker point (subsystems and other engine extras)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpecialPoint {
	pub name: String,
	/// Free-text engine properties, passed through opaque
	pub properties: String,
	pub position: Vec3,
	pub radius: f32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpecialChunk {
	pub points: Vec<SpecialPoint>,
}

impl SpecialChunk {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> io::Result<SpecialChunk>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let num = buf.read_u32::<LE>()?;
		let mut points = vec![];
		for _ in 0..num {
			points.push(SpecialPoint {
				name: buf.read_lstr()?,
				properties: buf.read_lstr()?,
				position: buf.read_vec3_le()?,
				radius: buf.read_f32::<LE>()?,
			});
		}

		Ok(SpecialChunk {
			points: points,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt + WriteBinExt,
	{
		buf.write_u32::<LE>(self.points.len() as u32)?;
		for point in self.points.iter() {
			buf.write_lstr(&point.name)?;
			buf.write_lstr(&point.properties)?;
			buf.write_vec3_le(point.position)?;
			buf.write_f32::<LE>(point.radius)?;
		}

		Ok(())
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathPoint {
	pub position: Vec3,
	pub radius: f32,
	/// Turret sub-models guarding this node
	pub turrets: Vec<u32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelPath {
	pub name: String,
	pub parent: String,
	pub points: Vec<PathPoint>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathChunk {
	pub paths: Vec<ModelPath>,
}

impl PathChunk {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> io::Result<PathChunk>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let num_paths = buf.read_u32::<LE>()?;
		let mut paths = vec![];
		for _ in 0..num_paths {
			let name = buf.read_lstr()?;
			let parent = buf.read_lstr()?;

			let num_points = buf.read_u32::<LE>()?;
			let mut points = vec![];
			for _ in 0..num_points {
				points.push(PathPoint {
					position: buf.read_vec3_le()?,
					radius: buf.read_f32::<LE>()?,
					turrets: read_ids(buf)?,
				});
			}

			paths.push(ModelPath {
				name: name,
				parent: parent,
				points: points,
			});
		}

		Ok(PathChunk {
			paths: paths,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt + WriteBinExt,
	{
		buf.write_u32::<LE>(self.paths.len() as u32)?;
		for path in self.paths.iter() {
			buf.write_lstr(&path.name)?;
			buf.write_lstr(&path.parent)?;
			buf.write_u32::<LE>(path.points.len() as u32)?;
			for point in path.points.iter() {
				buf.write_vec3_le(point.position)?;
				buf.write_f32::<LE>(point.radius)?;
				write_ids(&point.turrets, buf)?;
			}
		}

		Ok(())
	}
}

/// One tagged record of a POF stream. The chunk kind set is fixed by the
/// format; unrecognized tags ride along as raw bytes so a partial update
/// reproduces them exactly.
#[derive(Clone, Debug, PartialEq)]
pub enum Chunk {
	Header(HeaderChunk),
	Textures(TextureChunk),
	SubModel(SubModelChunk),
	Eyes(EyeChunk),
	Shield(ShieldChunk),
	AutoCenter(AutoCenterChunk),
	GunPoints(WeaponPointsChunk),
	MissilePoints(WeaponPointsChunk),
	TurretGuns(TurretChunk),
	TurretMissiles(TurretChunk),
	Docks(DockChunk),
	Glows(GlowChunk),
	Thrusters(ThrusterChunk),
	Specials(SpecialChunk),
	Paths(PathChunk),
	Unknown {
		tag: u32,
		data: Vec<u8>,
	},
}

impl Chunk {
	pub fn tag(&self) -> u32 {
		match self {
			Chunk::Header(_) => ID_HDR2,
			Chunk::Textures(_) => ID_TXTR,
			Chunk::SubModel(_) => ID_OBJ2,
			Chunk::Eyes(_) => ID_EYE,
			Chunk::Shield(_) => ID_SHLD,
			Chunk::AutoCenter(_) => ID_ACEN,
			Chunk::GunPoints(_) => ID_GPNT,
			Chunk::MissilePoints(_) => ID_MPNT,
			Chunk::TurretGuns(_) => ID_TGUN,
			Chunk::TurretMissiles(_) => ID_TMIS,
			Chunk::Docks(_) => ID_DOCK,
			Chunk::Glows(_) => ID_GLOW,
			Chunk::Thrusters(_) => ID_FUEL,
			Chunk::Specials(_) => ID_SPCL,
			Chunk::Paths(_) => ID_PATH,
			Chunk::Unknown { tag, .. } => *tag,
		}
	}

	/// The replaceable category this chunk belongs to; `None` for
	/// unrecognized chunks, which a partial update always carries forward
	pub fn category(&self) -> Option<Categories> {
		match self {
			Chunk::Header(_) => Some(Categories::HEADER),
			Chunk::Textures(_) => Some(Categories::TEXTURES),
			Chunk::SubModel(_) => Some(Categories::SUB_MODELS),
			Chunk::Eyes(_) => Some(Categories::EYES),
			Chunk::Shield(_) => Some(Categories::SHIELD),
			Chunk::AutoCenter(_) => Some(Categories::AUTO_CENTER),
			Chunk::GunPoints(_) => Some(Categories::GUN_POINTS),
			Chunk::MissilePoints(_) => Some(Categories::MISSILE_POINTS),
			Chunk::TurretGuns(_) => Some(Categories::TURRET_GUNS),
			Chunk::TurretMissiles(_) => Some(Categories::TURRET_MISSILES),
			Chunk::Docks(_) => Some(Categories::DOCKS),
			Chunk::Glows(_) => Some(Categories::GLOWS),
			Chunk::Thrusters(_) => Some(Categories::THRUSTERS),
			Chunk::Specials(_) => Some(Categories::SPECIALS),
			Chunk::Paths(_) => Some(Categories::PATHS),
			Chunk::Unknown { .. } => None,
		}
	}

	/// Position of this chunk kind in a freshly assembled file
	fn order(&self) -> u32 {
		match self {
			Chunk::Header(_) => 0,
			Chunk::Textures(_) => 1,
			Chunk::Shield(_) => 2,
			Chunk::Eyes(_) => 3,
			Chunk::GunPoints(_) => 4,
			Chunk::MissilePoints(_) => 5,
			Chunk::TurretGuns(_) => 6,
			Chunk::TurretMissiles(_) => 7,
			Chunk::Docks(_) => 8,
			Chunk::Glows(_) => 9,
			Chunk::Thrusters(_) => 10,
			Chunk::Specials(_) => 11,
			Chunk::Paths(_) => 12,
			Chunk::AutoCenter(_) => 13,
			Chunk::Unknown { .. } => 14,
			Chunk::SubModel(_) => 15,
		}
	}

	#[cfg(feature = "export")]
	pub fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		let mut payload = vec![];
		match self {
			Chunk::Header(chunk) => chunk.write(&mut payload)?,
			Chunk::Textures(chunk) => chunk.write(&mut payload)?,
			Chunk::SubModel(chunk) => chunk.write(&mut payload)?,
			Chunk::Eyes(chunk) => chunk.write(&mut payload)?,
			Chunk::Shield(chunk) => chunk.write(&mut payload)?,
			Chunk::AutoCenter(chunk) => chunk.write(&mut payload)?,
			Chunk::GunPoints(chunk) => chunk.write(&mut payload)?,
			Chunk::MissilePoints(chunk) => chunk.write(&mut payload)?,
			Chunk::TurretGuns(chunk) => chunk.write(&mut payload)?,
			Chunk::TurretMissiles(chunk) => chunk.write(&mut payload)?,
			Chunk::Docks(chunk) => chunk.write(&mut payload)?,
			Chunk::Glows(chunk) => chunk.write(&mut payload)?,
			Chunk::Thrusters(chunk) => chunk.write(&mut payload)?,
			Chunk::Specials(chunk) => chunk.write(&mut payload)?,
			Chunk::Paths(chunk) => chunk.write(&mut payload)?,
			Chunk::Unknown { data, .. } => payload.extend_from_slice(data),
		}

		buf.write_u32::<LE>(self.tag())?;
		buf.write_u32::<LE>(payload.len() as u32)?;
		buf.write_all(&payload)
	}
}

#[cfg(feature = "import")]
fn decode_chunk(tag: u32, data: Vec<u8>, offset: u64) -> Result<Chunk, PofImportError> {
	let mut cur = data.as_slice();
	let result = match tag {
		ID_HDR2 => HeaderChunk::read(&mut cur).map(Chunk::Header),
		ID_TXTR => TextureChunk::read(&mut cur).map(Chunk::Textures),
		ID_OBJ2 => SubModelChunk::read(&mut cur).map(Chunk::SubModel),
		ID_EYE => EyeChunk::read(&mut cur).map(Chunk::Eyes),
		ID_SHLD => ShieldChunk::read(&mut cur).map(Chunk::Shield),
		ID_ACEN => AutoCenterChunk::read(&mut cur).map(Chunk::AutoCenter),
		ID_GPNT => WeaponPointsChunk::read(&mut cur).map(Chunk::GunPoints),
		ID_MPNT => WeaponPointsChunk::read(&mut cur).map(Chunk::MissilePoints),
		ID_TGUN => TurretChunk::read(&mut cur).map(Chunk::TurretGuns),
		ID_TMIS => TurretChunk::read(&mut cur).map(Chunk::TurretMissiles),
		ID_DOCK => DockChunk::read(&mut cur).map(Chunk::Docks),
		ID_GLOW => GlowChunk::read(&mut cur).map(Chunk::Glows),
		ID_FUEL => ThrusterChunk::read(&mut cur).map(Chunk::Thrusters),
		ID_SPCL => SpecialChunk::read(&mut cur).map(Chunk::Specials),
		ID_PATH => PathChunk::read(&mut cur).map(Chunk::Paths),
		_ => {
			return Ok(Chunk::Unknown {
				tag: tag,
				data: data,
			})
		},
	};

	let consumed = (data.len() - cur.len()) as u32;
	match result {
		Ok(chunk) => {
			if cur.is_empty() {
				Ok(chunk)
			} else {
				Err(PofImportError::MalformedChunk {
					tag: untag4(tag),
					offset: offset,
					declared: data.len() as u32,
					consumed: consumed,
				})
			}
		},
		Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(PofImportError::MalformedChunk {
			tag: untag4(tag),
			offset: offset,
			declared: data.len() as u32,
			consumed: consumed,
		}),
		Err(e) => Err(e.into()),
	}
}

/// Ordered chunk collection of one POF file
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolyModel {
	pub chunks: Vec<Chunk>,
}

impl PolyModel {
	pub fn header(&self) -> Option<&HeaderChunk> {
		self.chunks.iter().find_map(|c| match c {
			Chunk::Header(chunk) => Some(chunk),
			_ => None,
		})
	}

	pub fn textures(&self) -> Option<&TextureChunk> {
		self.chunks.iter().find_map(|c| match c {
			Chunk::Textures(chunk) => Some(chunk),
			_ => None,
		})
	}

	pub fn shield(&self) -> Option<&ShieldChunk> {
		self.chunks.iter().find_map(|c| match c {
			Chunk::Shield(chunk) => Some(chunk),
			_ => None,
		})
	}

	/// Sub-model chunks in file order. Their position in this sequence is
	/// their merge identity.
	pub fn sub_models(&self) -> impl Iterator<Item = &SubModelChunk> {
		self.chunks.iter().filter_map(|c| match c {
			Chunk::SubModel(chunk) => Some(chunk),
			_ => None,
		})
	}

	/// Appends a sub-model chunk, defaulting its id to its position in the
	/// sub-model sequence when the host supplies none
	#[cfg(feature = "export")]
	pub fn push_sub_model(&mut self, mut sub: SubModelChunk, model_id: Option<u32>) {
		sub.model_id = match model_id {
			Some(id) => id,
			None => self.sub_models().count() as u32,
		};
		self.chunks.push(Chunk::SubModel(sub));
	}

	#[cfg(feature = "import")]
	pub fn read<R>(buf: &mut R) -> Result<PolyModel, PofImportError>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let mut sig = [0; 4];
		buf.read_exact(&mut sig)?;
		if u32::from_le_bytes(sig) != SIGNATURE {
			return Err(PofImportError::Signature(sig));
		}

		let version = buf.read_i32::<LE>()?;
		if version != VERSION {
			return Err(PofImportError::Version(version));
		}

		let mut chunks = vec![];
		let mut offset: u64 = 8;
		loop {
			let tag = match buf.read_u32::<LE>() {
				Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
				tag_result => tag_result?,
			};
			let len = buf.read_u32::<LE>()?;

			let mut data = vec![0; len as usize];
			if let Err(e) = buf.read_exact(data.as_mut_slice()) {
				if e.kind() == ErrorKind::UnexpectedEof {
					return Err(PofImportError::Truncated {
						tag: untag4(tag),
						offset: offset,
					});
				}
				return Err(e.into());
			}

			chunks.push(decode_chunk(tag, data, offset)?);
			offset += 8 + len as u64;
		}

		Ok(PolyModel {
			chunks: chunks,
		})
	}

	/// Validates cross-references, then emits the signature, version and
	/// every chunk in container order. Nothing is written on failure.
	#[cfg(feature = "export")]
	pub fn write<W>(&self, buf: &mut W) -> Result<(), PofExportError>
	where
		W: WriteBytesExt,
	{
		self.validate()?;

		buf.write_u32::<LE>(SIGNATURE)?;
		buf.write_i32::<LE>(VERSION)?;
		for chunk in self.chunks.iter() {
			chunk.write(buf)?;
		}

		Ok(())
	}

	#[cfg(feature = "export")]
	pub fn to_bytes(&self) -> Result<Vec<u8>, PofExportError> {
		let mut buf = vec![];
		self.write(&mut buf)?;
		Ok(buf)
	}

	/// Checks every sub-model reference against the current sub-model
	/// sequence. Dangling references are reported, never repaired.
	#[cfg(feature = "export")]
	pub fn validate(&self) -> Result<(), PofExportError> {
		let mut ids = vec![];
		for sub in self.sub_models() {
			if ids.contains(&sub.model_id) {
				return Err(PofExportError::DuplicateModelId(sub.model_id));
			}
			ids.push(sub.model_id);
		}

		let known = |id: u32| ids.contains(&id);

		if let Some(header) = self.header() {
			if header.num_sub_models as usize != ids.len() {
				return Err(PofExportError::SubModelCount {
					header: header.num_sub_models,
					actual: ids.len(),
				});
			}
			for id in header.detail_levels.iter() {
				if !known(*id) {
					return Err(dangling("detail level", *id));
				}
			}
			for id in header.debris.iter() {
				if !known(*id) {
					return Err(dangling("debris", *id));
				}
			}
		}

		for sub in self.sub_models() {
			if let Some(parent) = sub.parent {
				if !known(parent) {
					return Err(dangling("parent", parent));
				}
			}
		}

		for chunk in self.chunks.iter() {
			match chunk {
				Chunk::Eyes(eyes) => {
					for point in eyes.points.iter() {
						if !known(point.sub_model) {
							return Err(dangling("eye point", point.sub_model));
						}
					}
				},
				Chunk::TurretGuns(turrets) | Chunk::TurretMissiles(turrets) => {
					for bank in turrets.banks.iter() {
						if !known(bank.base) {
							return Err(dangling("turret base", bank.base));
						}
						if !known(bank.arm) {
							return Err(dangling("turret arm", bank.arm));
						}
					}
				},
				Chunk::Glows(glows) => {
					for bank in glows.banks.iter() {
						if !known(bank.sub_model) {
							return Err(dangling("glow bank", bank.sub_model));
						}
					}
				},
				_ => {},
			}
		}

		Ok(())
	}

	/// Replaces the chunks of every category in `replace` with the
	/// corresponding chunks from `incoming`, in incoming order, splicing
	/// them where the category first appeared. Everything else, unknown
	/// chunks included, carries over untouched. With no existing model the
	/// incoming chunks are arranged in canonical order. A metadata-only
	/// incoming sub-model inherits the geometry (and its derived extents)
	/// of its positional counterpart.
	#[cfg(feature = "export")]
	pub fn merge(existing: Option<PolyModel>, mut incoming: Vec<Chunk>, replace: Categories) -> PolyModel {
		let existing = match existing {
			Some(model) => model,
			None => {
				incoming.sort_by_key(Chunk::order);
				return PolyModel {
					chunks: incoming,
				};
			},
		};

		if replace.contains(Categories::SUB_MODELS) {
			let old: Vec<&SubModelChunk> = existing.sub_models().collect();
			let mut position = 0;
			for chunk in incoming.iter_mut() {
				if let Chunk::SubModel(sub) = chunk {
					if sub.is_metadata_only() {
						if let Some(old_sub) = old.get(position) {
							sub.geometry = old_sub.geometry.clone();
							sub.radius = old_sub.radius;
							sub.geo_center = old_sub.geo_center;
							sub.bbox_min = old_sub.bbox_min;
							sub.bbox_max = old_sub.bbox_max;
						}
					}
					position += 1;
				}
			}
		}

		let mut chunks = vec![];
		let mut spliced = Categories::empty();
		for chunk in existing.chunks.into_iter() {
			match chunk.category() {
				Some(category) if replace.contains(category) => {
					if !spliced.contains(category) {
						spliced |= category;
						for inc in incoming.iter() {
							if inc.category() == Some(category) {
								chunks.push(inc.clone());
							}
						}
					}
				},
				_ => chunks.push(chunk),
			}
		}

		// replaced categories the existing model never had
		let mut fresh: Vec<Chunk> = incoming.into_iter()
			.filter(|c| match c.category() {
				Some(category) => replace.contains(category) && !spliced.contains(category),
				None => false,
			})
			.collect();
		fresh.sort_by_key(Chunk::order);
		chunks.append(&mut fresh);

		PolyModel {
			chunks: chunks,
		}
	}
}

#[cfg(feature = "import")]
fn read_ids<R>(buf: &mut R) -> io::Result<Vec<u32>>
where
	R: ReadBytesExt,
{
	let num = buf.read_u32::<LE>()?;
	let mut ids = vec![];
	for _ in 0..num {
		ids.push(buf.read_u32::<LE>()?);
	}

	Ok(ids)
}

#[cfg(feature = "import")]
fn read_buffer<R>(buf: &mut R) -> io::Result<Vec<u8>>
where
	R: ReadBytesExt,
{
	let len = buf.read_u32::<LE>()?;
	let mut data = vec![0; len as usize];
	buf.read_exact(data.as_mut_slice())?;

	Ok(data)
}

#[cfg(feature = "export")]
fn write_ids<W>(ids: &[u32], buf: &mut W) -> io::Result<()>
where
	W: WriteBytesExt,
{
	buf.write_u32::<LE>(ids.len() as u32)?;
	for id in ids.iter() {
		buf.write_u32::<LE>(*id)?;
	}

	Ok(())
}

#[cfg(feature = "export")]
fn dangling(kind: &'static str, id: u32) -> PofExportError {
	PofExportError::DanglingReference {
		kind: kind,
		id: id,
	}
}

#[cfg(feature = "import")]
#[derive(Debug, Error)]
pub enum PofImportError {
	#[error("I/O error")]
	IO {
		#[from]
		source: io::Error,
	},
	#[error("Chunk {tag} at offset {offset} declares {declared} payload bytes, decoding took {consumed}")]
	MalformedChunk {
		tag: String,
		offset: u64,
		declared: u32,
		consumed: u32,
	},
	#[error("Not a POF file: {0:X?}")]
	Signature([u8; 4]),
	#[error("Chunk {tag} at offset {offset} overruns the file")]
	Truncated {
		tag: String,
		offset: u64,
	},
	#[error("Unknown/unsupported version: {0}")]
	Version(i32),
}

#[cfg(feature = "export")]
#[derive(Debug, Error)]
pub enum PofExportError {
	#[error("{kind} reference {id} points to no sub-model")]
	DanglingReference {
		kind: &'static str,
		id: u32,
	},
	#[error("Sub-model id {0} is used twice")]
	DuplicateModelId(u32),
	#[error("I/O error")]
	IO {
		#[from]
		source: io::Error,
	},
	#[error("Face has {0} corners, only 3 or 4 are supported")]
	MeshTopology(usize),
	#[error("Header counts {header} sub-models, the container holds {actual}")]
	SubModelCount {
		header: u32,
		actual: usize,
	},
	#[error("Texture {0:?} is not in the texture list")]
	UnknownTexture(String),
}

#[cfg(test)]
mod tests {
	use ultraviolet::vec::Vec2;

	use crate::mesh::{
		CornerData,
		FaceData
	};

	use super::*;

	fn tri_face(material: Option<&str>) -> FaceData {
		let normal = Vec3::new(0., 0., 1.);
		FaceData {
			corners: [Vec3::new(0., 0., 0.), Vec3::new(2., 0., 0.), Vec3::new(0., 2., 0.)].iter().map(|p| CornerData {
				position: *p,
				normal: normal,
				uv: Some(Vec2::new(p.x * 0.5, p.y * 0.5)),
			}).collect(),
			normal: normal,
			material: material.map(str::to_string),
		}
	}

	#[cfg(feature = "export")]
	fn hull_sub_model() -> SubModelChunk {
		let mesh = Mesh::build(&[tri_face(Some("hull01"))], &["hull01".to_string()], false).unwrap();
		let mut sub = SubModelChunk::new("detail0");
		sub.set_mesh(&mesh).unwrap();
		sub
	}

	#[cfg(feature = "export")]
	fn small_header() -> HeaderChunk {
		HeaderChunk {
			max_radius: 2.83,
			num_sub_models: 1,
			detail_levels: vec![0],
			mass: 350.0,
			inertia: [
				Vec3::new(1., 0., 0.),
				Vec3::new(0., 1., 0.),
				Vec3::new(0., 0., 1.),
			],
			cross_sections: vec![(0.0, 1.5), (2.0, 0.5)],
			lights: vec![HeaderLight {
				position: Vec3::new(0., 0., 2.),
				kind: 1,
			}],
			..HeaderChunk::default()
		}
	}

	#[cfg(feature = "export")]
	fn chunk_bytes(chunk: &Chunk) -> Vec<u8> {
		let mut buf = vec![];
		chunk.write(&mut buf).unwrap();
		buf
	}

	#[cfg(feature = "export")]
	fn small_model() -> PolyModel {
		PolyModel {
			chunks: vec![
				Chunk::Header(small_header()),
				Chunk::Textures(TextureChunk {
					textures: vec!["hull01".to_string()],
				}),
				Chunk::Eyes(EyeChunk {
					points: vec![EyePoint {
						sub_model: 0,
						offset: Vec3::new(0., 1., 0.),
						normal: Vec3::new(0., 0., 1.),
					}],
				}),
				Chunk::GunPoints(WeaponPointsChunk {
					banks: vec![WeaponBank {
						points: vec![WeaponPoint {
							position: Vec3::new(1., 0., 0.),
							normal: Vec3::new(0., 0., 1.),
						}],
					}],
				}),
				Chunk::Docks(DockChunk {
					bays: vec![DockBay {
						properties: "$name=dock01".to_string(),
						paths: vec![0],
						points: vec![DockPoint {
							position: Vec3::new(0., -1., 0.),
							normal: Vec3::new(0., -1., 0.),
						}],
					}],
				}),
				Chunk::Thrusters(ThrusterChunk {
					banks: vec![ThrusterBank {
						properties: String::new(),
						points: vec![GlowPoint {
							position: Vec3::new(0., 0., -2.),
							normal: Vec3::new(0., 0., -1.),
							radius: 0.5,
						}],
					}],
				}),
				Chunk::Glows(GlowChunk {
					banks: vec![GlowBank {
						disp_time: 0,
						on_time: 1000,
						off_time: 2000,
						sub_model: 0,
						lod: 0,
						kind: 0,
						properties: "$glow_texture=blink".to_string(),
						points: vec![GlowPoint {
							position: Vec3::new(0.5, 0.5, 0.),
							normal: Vec3::new(0., 0., 1.),
							radius: 0.1,
						}],
					}],
				}),
				Chunk::Specials(SpecialChunk {
					points: vec![SpecialPoint {
						name: "$engine01".to_string(),
						properties: String::new(),
						position: Vec3::new(0., 0., -1.),
						radius: 0.4,
					}],
				}),
				Chunk::Paths(PathChunk {
					paths: vec![ModelPath {
						name: "$path01".to_string(),
						parent: String::new(),
						points: vec![PathPoint {
							position: Vec3::new(0., 5., 0.),
							radius: 1.0,
							turrets: vec![],
						}],
					}],
				}),
				Chunk::AutoCenter(AutoCenterChunk {
					point: Vec3::new(0., 0., 0.5),
				}),
				Chunk::SubModel(hull_sub_model()),
			],
		}
	}

	#[cfg(all(feature = "import", feature = "export"))]
	#[test]
	fn test_model_round_trip() {
		let model = small_model();
		let bytes = model.to_bytes().unwrap();

		let reread = PolyModel::read(&mut bytes.as_slice()).unwrap();
		assert_eq!(model, reread);
		assert_eq!(bytes, reread.to_bytes().unwrap());
	}

	#[cfg(all(feature = "import", feature = "export"))]
	#[test]
	fn test_two_chunk_file_round_trips_exactly() {
		let mut header = small_header();
		header.cross_sections = vec![];
		header.lights = vec![];
		let model = PolyModel {
			chunks: vec![
				Chunk::Header(header),
				Chunk::SubModel(hull_sub_model()),
			],
		};

		let bytes = model.to_bytes().unwrap();
		let reread = PolyModel::read(&mut bytes.as_slice()).unwrap();
		assert_eq!(bytes, reread.to_bytes().unwrap());
	}

	#[cfg(all(feature = "import", feature = "export"))]
	#[test]
	fn test_sub_model_mesh_round_trip() {
		let mesh = Mesh::build(&[tri_face(Some("hull01"))], &["hull01".to_string()], false).unwrap();
		let sub = hull_sub_model();

		assert_eq!(Some(mesh), sub.mesh().unwrap());
		assert!(SubModelChunk::new("turret01").mesh().unwrap().is_none());
	}

	#[cfg(feature = "export")]
	#[test]
	fn test_sub_model_extents() {
		let sub = hull_sub_model();
		assert_eq!(Vec3::zero(), sub.bbox_min);
		assert_eq!(Vec3::new(2., 2., 0.), sub.bbox_max);
		assert!((sub.radius - 2.0).abs() < 1e-6);
		assert!(!sub.is_metadata_only());
	}

	#[cfg(feature = "export")]
	#[test]
	fn test_header_extents() {
		let mut header = HeaderChunk::default();
		let mut sub = hull_sub_model();
		sub.offset = Vec3::new(0., 0., 1.);

		header.update_extents([&sub]);
		assert_eq!(1, header.num_sub_models);
		assert!((header.max_radius - 3.0).abs() < 1e-6);
		assert_eq!(Vec3::new(0., 0., 1.), header.bbox_min);
		assert_eq!(Vec3::new(2., 2., 1.), header.bbox_max);
	}

	#[cfg(all(feature = "import", feature = "export"))]
	#[test]
	fn test_merge_replaces_only_selected_categories() {
		let existing = small_model();
		let mut replacement = small_header();
		replacement.mass = 9000.0;

		let merged = PolyModel::merge(
			Some(existing.clone()),
			vec![Chunk::Header(replacement.clone())],
			Categories::HEADER,
		);

		assert_eq!(existing.chunks.len(), merged.chunks.len());
		assert_eq!(Some(&replacement), merged.header());
		for (old, new) in existing.chunks.iter().zip(merged.chunks.iter()).skip(1) {
			assert_eq!(chunk_bytes(old), chunk_bytes(new));
		}
	}

	#[cfg(all(feature = "import", feature = "export"))]
	#[test]
	fn test_merge_keeps_unknown_chunks() {
		let mut bytes = vec![];
		bytes.extend_from_slice(&SIGNATURE.to_le_bytes());
		bytes.extend_from_slice(&VERSION.to_le_bytes());
		bytes.extend_from_slice(&rtag4!(b"PINF").to_le_bytes());
		bytes.extend_from_slice(&5u32.to_le_bytes());
		bytes.extend_from_slice(b"hello");
		{
			let chunk = Chunk::AutoCenter(AutoCenterChunk {
				point: Vec3::zero(),
			});
			chunk.write(&mut bytes).unwrap();
		}

		let model = PolyModel::read(&mut bytes.as_slice()).unwrap();
		let merged = PolyModel::merge(
			Some(model),
			vec![Chunk::AutoCenter(AutoCenterChunk {
				point: Vec3::new(0., 0., 9.),
			})],
			Categories::AUTO_CENTER,
		);

		let out = merged.to_bytes().unwrap();
		let reread = PolyModel::read(&mut out.as_slice()).unwrap();
		assert_eq!(&reread.chunks[0], &Chunk::Unknown {
			tag: rtag4!(b"PINF"),
			data: b"hello".to_vec(),
		});
		assert_eq!(&reread.chunks[1], &Chunk::AutoCenter(AutoCenterChunk {
			point: Vec3::new(0., 0., 9.),
		}));
	}

	#[cfg(feature = "export")]
	#[test]
	fn test_merge_grafts_geometry_into_metadata_only_sub_models() {
		let existing = small_model();
		let mut incoming = SubModelChunk::new("detail0-renamed");
		incoming.properties = "$special=subsystem".to_string();

		let merged = PolyModel::merge(
			Some(existing.clone()),
			vec![Chunk::SubModel(incoming)],
			Categories::SUB_MODELS,
		);

		let old = existing.sub_models().next().unwrap();
		let new = merged.sub_models().next().unwrap();
		assert_eq!("detail0-renamed", new.name);
		assert_eq!("$special=subsystem", new.properties);
		assert_eq!(old.geometry, new.geometry);
		assert_eq!(old.radius, new.radius);
		assert_eq!(old.bbox_max, new.bbox_max);
	}

	#[cfg(feature = "export")]
	#[test]
	fn test_merge_without_existing_orders_canonically() {
		let merged = PolyModel::merge(
			None,
			vec![
				Chunk::SubModel(hull_sub_model()),
				Chunk::AutoCenter(AutoCenterChunk {
					point: Vec3::zero(),
				}),
				Chunk::Textures(TextureChunk {
					textures: vec!["hull01".to_string()],
				}),
				Chunk::Header(small_header()),
			],
			Categories::all(),
		);

		let tags: Vec<u32> = merged.chunks.iter().map(Chunk::tag).collect();
		assert_eq!(vec![ID_HDR2, ID_TXTR, ID_ACEN, ID_OBJ2], tags);
	}

	#[cfg(feature = "export")]
	#[test]
	fn test_push_sub_model_defaults_ids_positionally() {
		let mut model = PolyModel::default();
		model.push_sub_model(SubModelChunk::new("detail0"), None);
		model.push_sub_model(SubModelChunk::new("turret01"), Some(7));
		model.push_sub_model(SubModelChunk::new("turret01-arm"), None);

		let ids: Vec<u32> = model.sub_models().map(|s| s.model_id).collect();
		assert_eq!(vec![0, 7, 2], ids);
	}

	#[cfg(feature = "import")]
	#[test]
	fn test_bad_signature() {
		let mut bytes = vec![];
		bytes.extend_from_slice(b"OHNO");
		bytes.extend_from_slice(&VERSION.to_le_bytes());

		assert!(matches!(
			PolyModel::read(&mut bytes.as_slice()),
			Err(PofImportError::Signature(_))
		));
	}

	#[cfg(feature = "import")]
	#[test]
	fn test_unsupported_version() {
		let mut bytes = vec![];
		bytes.extend_from_slice(&SIGNATURE.to_le_bytes());
		bytes.extend_from_slice(&1900i32.to_le_bytes());

		assert!(matches!(
			PolyModel::read(&mut bytes.as_slice()),
			Err(PofImportError::Version(1900))
		));
	}

	#[cfg(feature = "import")]
	#[test]
	fn test_truncated_chunk() {
		let mut bytes = vec![];
		bytes.extend_from_slice(&SIGNATURE.to_le_bytes());
		bytes.extend_from_slice(&VERSION.to_le_bytes());
		bytes.extend_from_slice(&ID_TXTR.to_le_bytes());
		bytes.extend_from_slice(&100u32.to_le_bytes());
		bytes.extend_from_slice(&[0; 4]);

		assert!(matches!(
			PolyModel::read(&mut bytes.as_slice()),
			Err(PofImportError::Truncated { .. })
		));
	}

	#[cfg(feature = "import")]
	#[test]
	fn test_malformed_chunk() {
		let mut bytes = vec![];
		bytes.extend_from_slice(&SIGNATURE.to_le_bytes());
		bytes.extend_from_slice(&VERSION.to_le_bytes());
		bytes.extend_from_slice(&ID_ACEN.to_le_bytes());
		bytes.extend_from_slice(&16u32.to_le_bytes());
		bytes.extend_from_slice(&[0; 16]);

		match PolyModel::read(&mut bytes.as_slice()) {
			Err(PofImportError::MalformedChunk { tag, offset, declared, consumed }) => {
				assert_eq!("ACEN", tag);
				assert_eq!(8, offset);
				assert_eq!(16, declared);
				assert_eq!(12, consumed);
			},
			other => panic!("expected a malformed chunk error, got {:?}", other),
		}
	}

	#[cfg(feature = "export")]
	#[test]
	fn test_validate_dangling_detail_level() {
		let mut model = small_model();
		if let Chunk::Header(header) = &mut model.chunks[0] {
			header.detail_levels = vec![3];
		}

		assert!(matches!(
			model.to_bytes(),
			Err(PofExportError::DanglingReference { kind: "detail level", id: 3 })
		));
	}

	#[cfg(feature = "export")]
	#[test]
	fn test_validate_sub_model_count() {
		let mut model = small_model();
		if let Chunk::Header(header) = &mut model.chunks[0] {
			header.num_sub_models = 2;
		}

		assert!(matches!(
			model.to_bytes(),
			Err(PofExportError::SubModelCount { header: 2, actual: 1 })
		));
	}

	#[cfg(feature = "export")]
	#[test]
	fn test_shield_neighbors() {
		let normal = Vec3::new(0., 0., 1.);
		let p = [
			Vec3::new(0., 0., 0.),
			Vec3::new(1., 0., 0.),
			Vec3::new(0., 1., 0.),
			Vec3::new(1., 1., 0.),
		];
		let tri = |a: Vec3, b: Vec3, c: Vec3| FaceData {
			corners: [a, b, c].iter().map(|v| CornerData {
				position: *v,
				normal: normal,
				uv: None,
			}).collect(),
			normal: normal,
			material: None,
		};

		let mesh = Mesh::build(&[tri(p[0], p[1], p[2]), tri(p[1], p[3], p[2])], &[], false).unwrap();
		let shield = ShieldChunk::from_mesh(&mesh).unwrap();

		assert_eq!(4, shield.verts.len());
		assert_eq!([0, 1, 2], shield.faces[0].verts);
		assert_eq!([1, 3, 2], shield.faces[1].verts);
		// only the diagonal edge is shared; open edges point back home
		assert_eq!([0, 1, 0], shield.faces[0].neighbors);
		assert_eq!([1, 1, 0], shield.faces[1].neighbors);
	}

	#[cfg(feature = "export")]
	#[test]
	fn test_shield_rejects_quads() {
		let normal = Vec3::new(0., 0., 1.);
		let quad = FaceData {
			corners: [
				Vec3::new(0., 0., 0.),
				Vec3::new(1., 0., 0.),
				Vec3::new(1., 1., 0.),
				Vec3::new(0., 1., 0.),
			].iter().map(|v| CornerData {
				position: *v,
				normal: normal,
				uv: None,
			}).collect(),
			normal: normal,
			material: None,
		};

		let mesh = Mesh::build(&[quad], &[], false).unwrap();
		assert!(matches!(
			ShieldChunk::from_mesh(&mesh),
			Err(PofExportError::MeshTopology(4))
		));
	}
}
