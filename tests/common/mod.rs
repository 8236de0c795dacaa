//! Shared fixtures for the end-to-end build tests

#![allow(dead_code)]

use dir_projector::pe::PeHeaders;
use flate2::Compression;
use flate2::write::{DeflateEncoder, GzEncoder};
use std::fs;
use std::io::Write;
use std::path::Path;

fn put_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// PE32 image with `.text` and a final `.rsrc` holding an empty root table
pub fn pe_image(machine: u16) -> Vec<u8> {
    let mut data = vec![0u8; 0x600];
    data[..2].copy_from_slice(b"MZ");
    put_u32(&mut data, 0x3c, 0x40);
    data[0x40..0x44].copy_from_slice(b"PE\0\0");

    let coff = 0x44;
    put_u16(&mut data, coff, machine);
    put_u16(&mut data, coff + 2, 2);
    put_u16(&mut data, coff + 16, 224);
    put_u16(&mut data, coff + 18, 0x0102);

    let opt = coff + 20;
    put_u16(&mut data, opt, 0x10b);
    put_u32(&mut data, opt + 16, 0x1000);
    put_u32(&mut data, opt + 20, 0x1000);
    put_u32(&mut data, opt + 28, 0x0040_0000);
    put_u32(&mut data, opt + 32, 0x1000);
    put_u32(&mut data, opt + 36, 0x200);
    put_u16(&mut data, opt + 40, 4);
    put_u16(&mut data, opt + 48, 4);
    put_u32(&mut data, opt + 60, 0x200);
    put_u16(&mut data, opt + 68, 2);
    put_u32(&mut data, opt + 72, 0x10_0000);
    put_u32(&mut data, opt + 76, 0x1000);
    put_u32(&mut data, opt + 80, 0x10_0000);
    put_u32(&mut data, opt + 84, 0x1000);
    put_u32(&mut data, opt + 92, 16);
    put_u32(&mut data, opt + 96 + 16, 0x2000);
    put_u32(&mut data, opt + 96 + 20, 16);

    let table = opt + 224;
    for (index, name, rva, ptr, flags) in [
        (0usize, &b".text"[..], 0x1000u32, 0x200u32, 0x6000_0020u32),
        (1, &b".rsrc"[..], 0x2000, 0x400, 0x4000_0040),
    ] {
        let at = table + index * 40;
        data[at..at + name.len()].copy_from_slice(name);
        put_u32(&mut data, at + 8, 0x10);
        put_u32(&mut data, at + 12, rva);
        put_u32(&mut data, at + 16, 0x200);
        put_u32(&mut data, at + 20, ptr);
        put_u32(&mut data, at + 36, flags);
    }
    data[0x200] = 0xC3;

    let headers = PeHeaders::parse(&data).unwrap();
    headers.update_size_fields(&mut data).unwrap();
    headers.update_checksum(&mut data);
    data
}

/// Thin big-endian Mach-O header for `cpu_type`
pub fn thin_macho(cpu_type: u32) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&0xFEED_FACEu32.to_be_bytes());
    data.extend_from_slice(&cpu_type.to_be_bytes());
    data.extend_from_slice(&0u32.to_be_bytes());
    data.resize(0x40, 0);
    data
}

/// Write a Windows skeleton directory; `xtra_3d` adds the Shockwave 3D Xtra
/// without any patchable bytes
pub fn windows_skeleton(root: &Path, xtra_3d: bool) {
    fs::create_dir_all(root.join("xtras/Net")).unwrap();
    fs::write(root.join("Projec32.skl"), pe_image(0x14c)).unwrap();
    fs::write(root.join("IML32.DLL"), b"dll").unwrap();
    fs::write(root.join("xtras/Net/INetURL.x32"), b"net").unwrap();
    if xtra_3d {
        fs::write(root.join("xtras/Shockwave 3D Asset.x32"), vec![0x90u8; 256]).unwrap();
    }
}

pub const INFO_PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>CFBundleExecutable</key>
	<string>Projector</string>
	<key>CFBundleIconFile</key>
	<string>projector.icns</string>
</dict>
</plist>
"#;

/// Write a Mac skeleton as a `.tar.gz` at `dest`
pub fn mac_skeleton_tgz(dest: &Path) {
    let binary = thin_macho(0x12);
    let files: [(&str, &[u8]); 8] = [
        ("Projector Resources/Contents/Info.plist", INFO_PLIST.as_bytes()),
        ("Projector Resources/Contents/PkgInfo", b"APPLAPRJ"),
        ("Projector Resources/Contents/Frameworks/DPLib.framework/DPLib", b"lib"),
        ("Projector Resources/Contents/MacOS/Projector", &binary),
        ("Projector Resources/Contents/Resources/projector.icns", b"icns"),
        ("Projector Resources/Contents/Resources/Projector.rsrc", b"rsrc"),
        ("xtras/Net/INetURL.xtra", b"net"),
        ("xtras/Media/QuickTime.xtra", b"qt"),
    ];

    let gz = GzEncoder::new(fs::File::create(dest).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(gz);
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(if path.ends_with("/Projector") { 0o755 } else { 0o644 });
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append_data(&mut header, path, contents).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// Write `<id>.deflate` launcher payloads into `dir`
pub fn launcher_dir(dir: &Path, launchers: &[(&str, Vec<u8>)]) {
    fs::create_dir_all(dir).unwrap();
    for (id, data) in launchers {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        fs::write(dir.join(format!("{id}.deflate")), encoder.finish().unwrap()).unwrap();
    }
}
