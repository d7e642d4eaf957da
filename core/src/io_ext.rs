use std::io::{
	Read,
	Result,
	Write
};

use ultraviolet::vec::{
	Vec2,
	Vec3
};

pub trait ReadBinExt: Read {
	/// Reads a length-prefixed string (4-byte little endian count, no
	/// terminator). An embedded NUL truncates the result.
	#[inline]
	fn read_lstr(&mut self) -> Result<String> {
		let mut len = [0; 4];
		self.read_exact(&mut len)?;

		let mut buf = vec![0; u32::from_le_bytes(len) as usize];
		self.read_exact(buf.as_mut_slice())?;

		let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
		Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
	}

	/// Reads a little endian 2D vector
	#[inline]
	fn read_vec2_le(&mut self) -> Result<Vec2> {
		let mut x = [0; 4];
		let mut y = x;

		self.read_exact(&mut x)?;
		self.read_exact(&mut y)?;

		Ok(Vec2::new(f32::from_le_bytes(x), f32::from_le_bytes(y)))
	}

	/// Reads a little endian 3D vector
	#[inline]
	fn read_vec3_le(&mut self) -> Result<Vec3> {
		let mut x = [0; 4];
		let mut y = x;
		let mut z = y;

		self.read_exact(&mut x)?;
		self.read_exact(&mut y)?;
		self.read_exact(&mut z)?;

		Ok(Vec3::new(f32::from_le_bytes(x), f32::from_le_bytes(y), f32::from_le_bytes(z)))
	}
}

impl<R> ReadBinExt for R
where
	R: Read + ?Sized,
{
}

pub trait WriteBinExt: Write {
	/// Writes a length-prefixed string (4-byte little endian count, no
	/// terminator)
	#[inline]
	fn write_lstr(&mut self, s: &str) -> Result<()> {
		self.write_all(&(s.len() as u32).to_le_bytes())?;
		self.write_all(s.as_bytes())
	}

	/// Writes a little endian 2D vector
	#[inline]
	fn write_vec2_le(&mut self, v: Vec2) -> Result<()> {
		self.write_all(&v.x.to_le_bytes())?;
		self.write_all(&v.y.to_le_bytes())
	}

	/// Writes a little endian 3D vector
	#[inline]
	fn write_vec3_le(&mut self, v: Vec3) -> Result<()> {
		self.write_all(&v.x.to_le_bytes())?;
		self.write_all(&v.y.to_le_bytes())?;
		self.write_all(&v.z.to_le_bytes())
	}
}

impl<W> WriteBinExt for W
where
	W: Write + ?Sized,
{
}
