//! HTML embed page for the Shockwave browser plugin

use super::config::HtmlSettings;
use super::patches::{PatchSet, PatchTally};
use super::{Build, Capabilities, write_output};
use crate::exceptions::{ProjectorError, Result};
use crate::utils::html_encode;

/// Writes one page, no skeleton and no auxiliary files
pub const CAPABILITIES: Capabilities = Capabilities {
    extension: ".html",
    config_newline: "\n",
    lingo_newline: "\n",
    splash_extension: "",
    supports_aux_files: false,
    write_skeleton: write_page,
    modify_skeleton: finalize,
};

const STYLE: &[&str] = &[
    "   object,",
    "   embed {",
    "    display: block;",
    "    outline: 0;",
    "   }",
    "   object:focus,",
    "   embed:focus {",
    "    outline: 0;",
    "   }",
    "   .main {",
    "    display: table;",
    "    height: 100%;",
    "    width: 100%;",
    "   }",
    "   .player {",
    "    display: table-cell;",
    "    vertical-align: middle;",
    "   }",
    "   .player object,",
    "   .player embed {",
    "    margin: 0 auto;",
    "   }",
];

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ProjectorError::InvalidConfig(format!("Required property: {name}"))),
    }
}

/// Leading spaces become the same number of tabs
fn indent_with_tabs(line: &str) -> String {
    let body = line.trim_start_matches(' ');
    let depth = line.len() - body.len();
    format!("{}{body}", "\t".repeat(depth))
}

/// Generated page for `settings`
///
/// # Errors
/// `InvalidConfig` when `src`, `width` or `height` is missing.
pub fn page(settings: &HtmlSettings) -> Result<String> {
    let src = required(Some(settings.src.as_str()), "src")?;
    let width = required(settings.width.as_deref(), "width")?;
    let height = required(settings.height.as_deref(), "height")?;

    let mut object: Vec<(&str, &str)> = vec![("classid", settings.classid.as_str())];
    if let Some(codebase) = &settings.codebase {
        object.push(("codebase", codebase.as_str()));
    }
    object.push(("width", width));
    object.push(("height", height));
    if let Some(id) = &settings.id {
        object.push(("id", id.as_str()));
    }

    let mut param: Vec<(&str, &str)> = vec![("movie", src)];

    let mut embed: Vec<(&str, &str)> = vec![("type", settings.mime_type.as_str())];
    if let Some(pluginspage) = &settings.pluginspage {
        embed.push(("pluginspage", pluginspage.as_str()));
    }
    embed.push(("width", width));
    embed.push(("height", height));
    embed.push(("src", src));

    if let Some(name) = &settings.name {
        object.push(("name", name.as_str()));
        param.push(("name", name.as_str()));
        embed.push(("name", name.as_str()));
    }

    let optional = [
        ("bgcolor", &settings.bgcolor),
        ("swstretchstyle", &settings.sw_stretch_style),
        ("swstretchhalign", &settings.sw_stretch_h_align),
        ("swStretchvalign", &settings.sw_stretch_v_align),
        ("swremote", &settings.sw_remote),
        ("sw1", &settings.sw1),
        ("sw2", &settings.sw2),
        ("sw3", &settings.sw3),
        ("sw4", &settings.sw4),
        ("sw5", &settings.sw5),
        ("sw6", &settings.sw6),
        ("sw7", &settings.sw7),
        ("sw8", &settings.sw8),
        ("sw9", &settings.sw9),
        ("progress", &settings.progress),
        ("logo", &settings.logo),
        ("playerversion", &settings.player_version),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            param.push((key, value.as_str()));
            embed.push((key, value.as_str()));
        }
    }

    let mut lines: Vec<String> = vec!["<!DOCTYPE html>".to_string()];
    lines.push(match &settings.lang {
        Some(lang) => format!("<html lang=\"{}\">", html_encode(lang)),
        None => "<html>".to_string(),
    });
    lines.push(" <head>".to_string());
    lines.push("  <meta charset=\"UTF-8\">".to_string());
    lines.push("  <meta http-equiv=\"X-UA-Compatible\" content=\"IE=Edge\">".to_string());
    if let Some(title) = &settings.title {
        lines.push(format!("  <title>{}</title>", html_encode(title)));
    }
    for line in ["  <style>", "   * {", "    margin: 0;", "    padding: 0;", "   }"] {
        lines.push(line.to_string());
    }
    for line in ["   html,", "   body {", "    height: 100%;", "   }", "   body {"] {
        lines.push(line.to_string());
    }
    if let Some(background) = &settings.background {
        lines.push(format!("    background: {};", html_encode(background)));
    }
    if let Some(color) = &settings.color {
        lines.push(format!("    color: {};", html_encode(color)));
    }
    lines.push("    font-family: Verdana, Geneva, sans-serif;".to_string());
    lines.push("   }".to_string());
    lines.extend(STYLE.iter().map(|s| s.to_string()));
    for line in [
        "  </style>",
        " </head>",
        " <body>",
        "  <div class=\"main\">",
        "   <div class=\"player\">",
    ] {
        lines.push(line.to_string());
    }

    lines.push("    <object".to_string());
    lines.extend(object.iter().map(|(k, v)| format!("     {k}=\"{}\"", html_encode(v))));
    lines.push("    >".to_string());
    lines.extend(
        param
            .iter()
            .map(|(k, v)| format!("     <param name=\"{k}\" value=\"{}\">", html_encode(v))),
    );
    lines.push("     <embed".to_string());
    lines.extend(embed.iter().map(|(k, v)| format!("      {k}=\"{}\"", html_encode(v))));
    lines.push("     >".to_string());
    for line in ["    </object>", "   </div>", "  </div>", " </body>", "</html>", ""] {
        lines.push(line.to_string());
    }

    Ok(lines.iter().map(|l| indent_with_tabs(l)).collect::<Vec<_>>().join("\n"))
}

fn write_page(build: &Build<'_>) -> Result<PatchSet> {
    let settings = build
        .config
        .kind
        .html()
        .ok_or_else(|| ProjectorError::InvalidConfig("Not an HTML projector".to_string()))?;
    let data = match &settings.html {
        Some(custom) => custom.resolve("\n")?,
        None => page(settings)?.into_bytes(),
    };
    write_output(&build.paths.path, &data)?;
    Ok(PatchSet::new())
}

fn finalize(_build: &Build<'_>, _tally: &mut PatchTally) -> Result<()> {
    Ok(())
}
