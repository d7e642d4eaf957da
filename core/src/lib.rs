#[cfg(feature = "io_ext")]
pub mod io_ext;

/// Converts a 4-byte string into a 32-bit little endian integer.
/// Byte strings longer than 4 bytes are truncated.
#[macro_export]
macro_rules! rtag4 {
	($b4: literal) => {
		u32::from_le_bytes([$b4[0], $b4[1], $b4[2], $b4[3]])
	}
}

/// Converts a 4-byte string into a 32-bit big endian integer.
/// Byte strings longer than 4 bytes are truncated.
#[macro_export]
macro_rules! tag4 {
	($b4: literal) => {
		u32::from_be_bytes([$b4[0], $b4[1], $b4[2], $b4[3]])
	}
}

/// Recovers the printable form of a little endian tag integer.
/// Non-printable bytes become '?'.
pub fn untag4(tag: u32) -> String {
	tag.to_le_bytes().iter().map(|b| {
		if b.is_ascii_graphic() || *b == b' ' {
			*b as char
		} else {
			'?'
		}
	}).collect()
}
