//! Font discovery for the paged export.
//!
//! The bundled Roboto family is searched first; when it is missing, well-known system families
//! are tried in order (Arial on Windows, then Liberation Sans and DejaVu Sans on Linux).

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use genpdf::error::{Error, ErrorKind};
use genpdf::fonts::{self, FontData, FontFamily};
use log::{debug, warn};

/// Name of the bundled font family.
pub const DEFAULT_FONT_FAMILY_NAME: &str = "Roboto";

/// Overrides the directory searched for the bundled family.
pub const FONTS_DIR_ENV: &str = "STORYBOOK_FONTS_DIR";

/// Overrides the directory searched for the Windows fallback family.
pub const WINDOWS_FONTS_DIR_ENV: &str = "STORYBOOK_WINDOWS_FONTS_DIR";

const FONT_FILES: &[&str] = &[
    "Roboto-Regular.ttf",
    "Roboto-Bold.ttf",
    "Roboto-Italic.ttf",
    "Roboto-BoldItalic.ttf",
];

struct SystemFamily {
    name: &'static str,
    regular: &'static str,
    bold: &'static str,
    italic: &'static str,
    bold_italic: &'static str,
    directories: &'static [&'static str],
}

static ARIAL: SystemFamily = SystemFamily {
    name: "Arial",
    regular: "arial.ttf",
    bold: "arialbd.ttf",
    italic: "ariali.ttf",
    bold_italic: "arialbi.ttf",
    directories: &[],
};

const LINUX_FAMILIES: &[SystemFamily] = &[
    SystemFamily {
        name: "Liberation Sans",
        regular: "LiberationSans-Regular.ttf",
        bold: "LiberationSans-Bold.ttf",
        italic: "LiberationSans-Italic.ttf",
        bold_italic: "LiberationSans-BoldItalic.ttf",
        directories: &[
            "/usr/share/fonts/truetype/liberation",
            "/usr/share/fonts/truetype/liberation2",
            "/usr/share/fonts/liberation-sans",
            "/usr/share/fonts/liberation",
            "/usr/share/fonts/TTF",
        ],
    },
    SystemFamily {
        name: "DejaVu Sans",
        regular: "DejaVuSans.ttf",
        bold: "DejaVuSans-Bold.ttf",
        italic: "DejaVuSans-Oblique.ttf",
        bold_italic: "DejaVuSans-BoldOblique.ttf",
        directories: &[
            "/usr/share/fonts/truetype/dejavu",
            "/usr/share/fonts/dejavu-sans-fonts",
            "/usr/share/fonts/dejavu",
            "/usr/share/fonts/TTF",
        ],
    },
];

/// Path of the bundled font directory inside the crate sources.
pub fn bundled_fonts_source_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts")
}

fn font_directory_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = env_path(FONTS_DIR_ENV) {
        candidates.push(path);
    }

    if let Ok(current_exe) = env::current_exe() {
        if let Some(bin_dir) = current_exe.parent() {
            let candidate = bin_dir.join("assets/fonts");
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
    }

    let manifest_candidate = bundled_fonts_source_dir();
    if !candidates.contains(&manifest_candidate) {
        candidates.push(manifest_candidate);
    }

    candidates
}

fn missing_font_files(path: &Path) -> Vec<PathBuf> {
    FONT_FILES
        .iter()
        .map(|name| path.join(name))
        .filter(|candidate| !candidate.is_file())
        .collect()
}

fn resolve_font_directory() -> Result<PathBuf, Error> {
    let mut attempts = Vec::new();

    for candidate in font_directory_candidates() {
        let exists = candidate.is_dir();
        let missing = missing_font_files(&candidate);

        if exists && missing.is_empty() {
            return Ok(candidate);
        }

        let reason = if !exists {
            format!("directory missing at {}", candidate.display())
        } else {
            let missing_list = missing
                .iter()
                .map(|path| path.file_name().unwrap_or_default().to_string_lossy())
                .collect::<Vec<_>>()
                .join(", ");
            format!("missing files [{}]", missing_list)
        };

        attempts.push(format!("{} ({})", candidate.display(), reason));
    }

    Err(Error::new(
        format!(
            "Unable to locate bundled font directory. Checked: {}. Set {} to a directory with the Roboto family.",
            attempts.join(", "),
            FONTS_DIR_ENV
        ),
        io::Error::new(io::ErrorKind::NotFound, "bundled fonts directory not found"),
    ))
}

fn load_bundled_font_family() -> Result<FontFamily<FontData>, Error> {
    let directory = resolve_font_directory()?;

    fonts::from_files(&directory, DEFAULT_FONT_FAMILY_NAME, None).map_err(|err| {
        Error::new(
            format!(
                "Failed to load default font family '{}' from {}: {}",
                DEFAULT_FONT_FAMILY_NAME,
                directory.display(),
                err
            ),
            io::Error::new(io::ErrorKind::Other, err.to_string()),
        )
    })
}

fn env_path(var: &str) -> Option<PathBuf> {
    env::var_os(var).and_then(|value| {
        let path = PathBuf::from(value);
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    })
}

fn windows_font_directory() -> Option<PathBuf> {
    if let Some(path) = env_path(WINDOWS_FONTS_DIR_ENV) {
        return Some(path);
    }

    for var in ["WINDIR", "SystemRoot"] {
        if let Some(root) = env_path(var) {
            let candidate = root.join("Fonts");
            if candidate.is_dir() {
                return Some(candidate);
            }
        }
    }

    None
}

fn load_system_font(directory: &Path, file: &str, style: &str) -> Result<FontData, Error> {
    let path = directory.join(file);
    FontData::load(&path, None).map_err(|err| {
        let io_kind = if path.is_file() {
            io::ErrorKind::Other
        } else {
            io::ErrorKind::NotFound
        };
        Error::new(
            format!(
                "Failed to load fallback {} font at {}: {}",
                style,
                path.display(),
                err
            ),
            io::Error::new(io_kind, err.to_string()),
        )
    })
}

fn load_system_family(
    family: &SystemFamily,
    directory: &Path,
) -> Result<FontFamily<FontData>, Error> {
    Ok(FontFamily {
        regular: load_system_font(directory, family.regular, "regular")?,
        bold: load_system_font(directory, family.bold, "bold")?,
        italic: load_system_font(directory, family.italic, "italic")?,
        bold_italic: load_system_font(directory, family.bold_italic, "bold italic")?,
    })
}

fn system_candidates() -> Vec<(&'static SystemFamily, PathBuf)> {
    let mut candidates = Vec::new();
    if let Some(directory) = windows_font_directory() {
        candidates.push((&ARIAL, directory));
    }
    for family in LINUX_FAMILIES {
        for directory in family.directories {
            candidates.push((family, PathBuf::from(directory)));
        }
    }
    candidates
}

fn system_fallback_font_family() -> Result<(&'static str, FontFamily<FontData>), Error> {
    let mut attempts = Vec::new();
    for (family, directory) in system_candidates() {
        if !directory.join(family.regular).is_file() {
            continue;
        }
        match load_system_family(family, &directory) {
            Ok(loaded) => return Ok((family.name, loaded)),
            Err(err) => {
                debug!("Skipping fallback family '{}': {}", family.name, err);
                attempts.push(format!("{} in {}", family.name, directory.display()));
            }
        }
    }

    let detail = if attempts.is_empty() {
        "no system font family was found".to_owned()
    } else {
        format!("incomplete families: {}", attempts.join(", "))
    };
    Err(Error::new(
        format!("System font fallback failed: {}", detail),
        io::Error::new(io::ErrorKind::NotFound, "system fonts not found"),
    ))
}

/// Whether the error means fonts are absent rather than broken.
pub fn fonts_missing(err: &Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::IoError(io_err)
            if io_err.kind() == io::ErrorKind::NotFound
                || io_err.kind() == io::ErrorKind::PermissionDenied
    )
}

/// Returns the bundled Roboto font family if available and falls back to a system family when
/// the bundled fonts are missing.
pub fn default_font_family() -> Result<FontFamily<FontData>, Error> {
    match load_bundled_font_family() {
        Ok(family) => Ok(family),
        Err(err) if fonts_missing(&err) => match system_fallback_font_family() {
            Ok((name, fallback)) => {
                warn!(
                    "Bundled fonts unavailable ({}); falling back to system '{}' family.",
                    err, name
                );
                Ok(fallback)
            }
            Err(fallback_err) => {
                warn!(
                    "Bundled fonts unavailable ({}); system fallback failed: {}",
                    err, fallback_err
                );
                Err(Error::new(
                    format!(
                        "Bundled fonts unavailable and system fallback failed: {}",
                        fallback_err
                    ),
                    io::Error::new(io::ErrorKind::NotFound, "default fonts are not available"),
                ))
            }
        },
        Err(err) => Err(err),
    }
}

/// Indicates whether the bundled font family is present on disk.
pub fn bundled_fonts_available() -> bool {
    resolve_font_directory().is_ok()
}

/// Indicates whether any usable font family, bundled or system, can be loaded.
pub fn default_fonts_available() -> bool {
    bundled_fonts_available() || system_fallback_font_family().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_directory_is_always_searched() {
        let candidates = font_directory_candidates();
        assert!(candidates.contains(&bundled_fonts_source_dir()));
    }

    #[test]
    fn missing_directory_reports_every_file() {
        let missing = missing_font_files(Path::new("/__storybook_missing_fonts__"));
        assert_eq!(missing.len(), FONT_FILES.len());
    }

    #[test]
    fn not_found_errors_count_as_missing_fonts() {
        let err = Error::new("gone", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(fonts_missing(&err));
        let err = Error::new("broken", ErrorKind::InvalidData);
        assert!(!fonts_missing(&err));
    }
}
