//! Authenticode certificate table handling
//!
//! The certificate table is addressed by file offset (not RVA) through data
//! directory 4 and sits outside every section, normally at the very end of
//! the file.

use super::{DIRECTORY_SECURITY, PeHeaders, align_up};
use crate::exceptions::{ProjectorError, Result};
use log::debug;

fn certificate_range(data: &[u8], headers: &PeHeaders) -> Result<Option<(usize, usize)>> {
    let Some((offset, size)) = headers.data_directory(data, DIRECTORY_SECURITY)? else {
        return Ok(None);
    };
    let start = offset as usize;
    let end = start + size as usize;
    if size == 0 || end > data.len() {
        return Err(ProjectorError::MalformedExecutable(format!(
            "certificate table 0x{start:x}+0x{size:x} outside file"
        )));
    }
    Ok(Some((start, end)))
}

/// Raw certificate table bytes, if the image carries one
pub fn signature_get(data: &[u8]) -> Result<Option<Vec<u8>>> {
    let headers = PeHeaders::parse(data)?;
    Ok(certificate_range(data, &headers)?.map(|(start, end)| data[start..end].to_vec()))
}

/// Remove the certificate table and clear its directory entry
pub fn signature_strip(mut data: Vec<u8>) -> Result<Vec<u8>> {
    let headers = PeHeaders::parse(&data)?;
    let Some((start, end)) = certificate_range(&data, &headers)? else {
        return Ok(data);
    };
    data.drain(start..end);
    headers.set_data_directory(&mut data, DIRECTORY_SECURITY, 0, 0)?;
    headers.update_checksum(&mut data);
    debug!("🔏 Stripped {} byte certificate table", end - start);
    Ok(data)
}

/// Append `signature` as the certificate table, 8-byte aligned
pub fn signature_attach(data: Vec<u8>, signature: &[u8]) -> Result<Vec<u8>> {
    let mut data = signature_strip(data)?;
    let headers = PeHeaders::parse(&data)?;
    let start = align_up(data.len(), 8);
    data.resize(start, 0);
    data.extend_from_slice(signature);

    let offset = u32::try_from(start)
        .map_err(|_| ProjectorError::MalformedExecutable("image too large".to_string()))?;
    let size = u32::try_from(signature.len())
        .map_err(|_| ProjectorError::MalformedExecutable("signature too large".to_string()))?;
    headers.set_data_directory(&mut data, DIRECTORY_SECURITY, offset, size)?;
    headers.update_checksum(&mut data);
    debug!("🔏 Attached {} byte certificate table at 0x{start:x}", signature.len());
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::test_image;

    fn fake_certificate() -> Vec<u8> {
        let mut cert = 24u32.to_le_bytes().to_vec();
        cert.extend_from_slice(&0x0200u16.to_le_bytes());
        cert.extend_from_slice(&0x0002u16.to_le_bytes());
        cert.extend_from_slice(&[0xAB; 16]);
        cert
    }

    #[test]
    fn test_unsigned_image_has_no_signature() {
        let image = test_image::build(0x14c, true);
        assert_eq!(signature_get(&image).unwrap(), None);
        assert_eq!(signature_strip(image.clone()).unwrap(), image);
    }

    #[test]
    fn test_attach_then_strip() {
        let mut image = test_image::build(0x14c, true);
        image.push(0x01);
        let signed = signature_attach(image.clone(), &fake_certificate()).unwrap();
        assert_eq!(signed.len() % 8, 0);
        assert_eq!(signature_get(&signed).unwrap(), Some(fake_certificate()));

        // alignment padding in front of the table stays behind
        let stripped = signature_strip(signed).unwrap();
        assert_eq!(signature_get(&stripped).unwrap(), None);
        assert_eq!(stripped.len(), align_up(image.len(), 8));
        assert_eq!(stripped[0x200..image.len()], image[0x200..]);
    }

    #[test]
    fn test_certificate_outside_file_is_malformed() {
        let mut image = test_image::build(0x14c, true);
        let headers = PeHeaders::parse(&image).unwrap();
        headers
            .set_data_directory(&mut image, DIRECTORY_SECURITY, 0x10_0000, 8)
            .unwrap();
        assert!(matches!(
            signature_get(&image),
            Err(ProjectorError::MalformedExecutable(_))
        ));
    }
}
