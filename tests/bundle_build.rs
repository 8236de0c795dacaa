//! End-to-end bundle builds through the manifest API

mod common;

use dir_projector::{BuildOptions, ProjectorError, build_projector};
use dir_projector::macho::{MachoTypes, read_types_file};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_otto_windows_bundle_with_launcher() {
    let temp = TempDir::new().unwrap();
    common::windows_skeleton(&temp.path().join("skeleton"), false);
    let launchers = [("windows-i686", common::pe_image(0x14c))];
    common::launcher_dir(&temp.path().join("launchers"), &launchers);
    fs::create_dir_all(temp.path().join("data/.git")).unwrap();
    fs::write(temp.path().join("data/movie.dir"), b"RIFX").unwrap();
    fs::write(temp.path().join("data/.git/HEAD"), b"ref").unwrap();
    fs::write(
        temp.path().join("manifest.json"),
        r#"{
            "projector": {
                "path": "dist/Game.exe",
                "settings": {
                    "skeleton": "skeleton",
                    "config": {"lines": ["[Settings]", "movie=data/movie.dir"]}
                },
                "kind": {"otto_windows": {"remove_signature": true}}
            },
            "bundle": {
                "resources": [
                    {
                        "destination": "data",
                        "source": "data",
                        "options": {"mtime": "2020-01-01T00:00:00Z"}
                    }
                ]
            }
        }"#,
    )
    .unwrap();

    let options = BuildOptions {
        launchers_dir: Some(temp.path().join("launchers")),
    };
    let report = build_projector(&temp.path().join("manifest.json"), None, options).unwrap();
    assert_eq!(report.patches.get("Projec32.skl"), 1);

    let dist = temp.path().join("dist");
    let launcher = fs::read(dist.join("Game.exe")).unwrap();
    assert_eq!(dir_projector::pe::machine_type(&launcher).unwrap(), 0x14c);
    assert!(dist.join("Game/Game.exe").is_file());
    assert_eq!(
        fs::read(dist.join("Game/Game.INI")).unwrap(),
        b"[Settings]\r\nmovie=data/movie.dir"
    );
    assert_eq!(fs::read(dist.join("Game/data/movie.dir")).unwrap(), b"RIFX");
    assert!(!dist.join("Game/data/.git").exists());

    let metadata = fs::metadata(dist.join("Game/data")).unwrap();
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    assert_eq!(mtime.unix_seconds(), 1_577_836_800);
}

#[test]
fn test_mac_bundle_mirrors_nested_binary() {
    let temp = TempDir::new().unwrap();
    common::mac_skeleton_tgz(&temp.path().join("skeleton.tar.gz"));
    let launchers = [("mac-app-ppc", common::thin_macho(0x12))];
    common::launcher_dir(&temp.path().join("launchers"), &launchers);
    fs::write(
        temp.path().join("manifest.json"),
        r#"{
            "projector": {
                "path": "Game.app",
                "settings": {"skeleton": "skeleton.tar.gz"},
                "kind": {"mac_app": {"binary_name": "Game"}}
            },
            "bundle": {}
        }"#,
    )
    .unwrap();

    let options = BuildOptions {
        launchers_dir: Some(temp.path().join("launchers")),
    };
    build_projector(&temp.path().join("manifest.json"), None, options).unwrap();

    let outer = temp.path().join("Game.app");
    let nested = outer.join("Contents/Resources/Game.app");
    assert!(nested.join("Contents/MacOS/Game").is_file());
    assert!(matches!(
        read_types_file(&outer.join("Contents/MacOS/Game")).unwrap(),
        MachoTypes::Thin(t) if t.cpu_type == 0x12
    ));
    assert_eq!(
        fs::read(outer.join("Contents/Info.plist")).unwrap(),
        fs::read(nested.join("Contents/Info.plist")).unwrap()
    );
    assert_eq!(fs::read(outer.join("Contents/PkgInfo")).unwrap(), b"APPLAPRJ");
    assert!(outer.join("Contents/Resources/Game.icns").is_file());
}

#[test]
fn test_bundle_without_launchers_fails() {
    let temp = TempDir::new().unwrap();
    common::windows_skeleton(&temp.path().join("skeleton"), false);
    common::launcher_dir(&temp.path().join("launchers"), &[]);
    fs::write(
        temp.path().join("manifest.json"),
        r#"{
            "projector": {
                "path": "Game.exe",
                "settings": {"skeleton": "skeleton"},
                "kind": {"windows_exe": {}}
            },
            "bundle": {"flat": false}
        }"#,
    )
    .unwrap();

    let options = BuildOptions {
        launchers_dir: Some(temp.path().join("launchers")),
    };
    let err = build_projector(&temp.path().join("manifest.json"), None, options).unwrap_err();
    assert!(matches!(err, ProjectorError::MissingLauncher(_)));
}
