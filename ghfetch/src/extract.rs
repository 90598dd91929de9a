//! Turning a downloaded buffer into files inside a scratch directory.
//!
//! The asset name only selects how the buffer is decoded. Every archive
//! member is placed through [`sanitize::contained_join`], links are never
//! created, and special files reject the whole archive.

use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{FetchError, FsContext, Result};
use crate::sanitize::{self, contained_join, contained_link_target};

/// Compression wrapped around a tarball.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCompression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

/// How a downloaded asset is turned into files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Zip,
    Tar(TarCompression),
    /// A `.gz` that may or may not hold a tarball.
    Gzip,
    /// Saved byte-for-byte.
    Raw,
}

/// Longest suffixes first so `.tar.gz` wins over `.gz`.
const ARCHIVE_SUFFIXES: &[(&str, AssetKind)] = &[
    (".tar.bz2", AssetKind::Tar(TarCompression::Bzip2)),
    (".tar.gz", AssetKind::Tar(TarCompression::Gzip)),
    (".tar.xz", AssetKind::Tar(TarCompression::Xz)),
    (".tbz2", AssetKind::Tar(TarCompression::Bzip2)),
    (".tar", AssetKind::Tar(TarCompression::None)),
    (".tbz", AssetKind::Tar(TarCompression::Bzip2)),
    (".tgz", AssetKind::Tar(TarCompression::Gzip)),
    (".txz", AssetKind::Tar(TarCompression::Xz)),
    (".zip", AssetKind::Zip),
];

impl AssetKind {
    /// Classify an asset by its file name, ignoring case
    pub fn detect(asset_name: &str) -> Self {
        let lower = asset_name.to_ascii_lowercase();
        ARCHIVE_SUFFIXES
            .iter()
            .find(|(suffix, _)| lower.ends_with(suffix))
            .map(|(_, kind)| *kind)
            .unwrap_or_else(|| {
                if lower.ends_with(".gz") {
                    AssetKind::Gzip
                } else {
                    AssetKind::Raw
                }
            })
    }
}

/// Strip the suffix that [`AssetKind::detect`] recognised, if any.
pub fn strip_kind_suffix(asset_name: &str) -> &str {
    let lower = asset_name.to_ascii_lowercase();
    let suffix_len = ARCHIVE_SUFFIXES
        .iter()
        .map(|(suffix, _)| *suffix)
        .chain(std::iter::once(".gz"))
        .find(|suffix| lower.ends_with(suffix))
        .map(str::len)
        .unwrap_or(0);
    &asset_name[..asset_name.len() - suffix_len]
}

/// A private working directory for one asset, created inside the output
/// directory so that promoting its contents is a rename.
///
/// Whatever is left in it is deleted on drop, including on error paths.
pub struct ScratchDir {
    dir: TempDir,
    asset_name: String,
    label: String,
}

impl ScratchDir {
    pub fn new_in(parent: &Path, asset_name: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(".ghfetch-")
            .tempdir_in(parent)
            .fs_context(parent)?;
        Ok(Self {
            dir,
            asset_name: asset_name.to_string(),
            label: strip_kind_suffix(asset_name).to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn asset_name(&self) -> &str {
        &self.asset_name
    }

    /// Name used for a directory that has to wrap several top-level entries
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Decode `buffer` into `dest` according to the asset's kind.
pub fn unpack(buffer: &[u8], asset_name: &str, dest: &Path) -> Result<()> {
    let kind = AssetKind::detect(asset_name);
    tracing::debug!("Treating {} as {:?}", asset_name, kind);

    match kind {
        AssetKind::Zip => extract_zip(buffer, asset_name, dest),
        AssetKind::Tar(compression) => {
            extract_tar(tar_reader(compression, buffer), asset_name, dest)
        }
        AssetKind::Gzip => {
            let data = gunzip(buffer, asset_name)?;
            if looks_like_tar(&data) {
                tracing::debug!("{} holds a tarball", asset_name);
                extract_tar(Cursor::new(data), asset_name, dest)
            } else {
                write_single(dest, strip_kind_suffix(asset_name), &data)
            }
        }
        AssetKind::Raw => write_single(dest, asset_name, buffer),
    }
}

/// Concatenated members and streams (pigz, pbzip2, bgzip) are all decoded.
fn tar_reader<'a>(compression: TarCompression, buffer: &'a [u8]) -> Box<dyn Read + 'a> {
    match compression {
        TarCompression::None => Box::new(buffer),
        TarCompression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(buffer)),
        TarCompression::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(buffer)),
        TarCompression::Xz => Box::new(xz2::read::XzDecoder::new_multi_decoder(buffer)),
    }
}

fn gunzip(buffer: &[u8], asset_name: &str) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    flate2::read::MultiGzDecoder::new(buffer)
        .read_to_end(&mut data)
        .map_err(|e| FetchError::corrupt(asset_name, e))?;
    Ok(data)
}

/// True when the first 512-byte block parses as a tar header.
fn looks_like_tar(data: &[u8]) -> bool {
    if data.len() < 512 {
        return false;
    }
    let mut archive = tar::Archive::new(data);
    match archive.entries() {
        Ok(mut entries) => matches!(entries.next(), Some(Ok(_))),
        Err(_) => false,
    }
}

/// Save one file named `name` into `dest`.
fn write_single(dest: &Path, name: &str, data: &[u8]) -> Result<()> {
    if !sanitize::is_single_component(name) {
        return Err(FetchError::InvalidName {
            name: name.to_string(),
        });
    }
    let target = dest.join(name);
    fs::write(&target, data).fs_context(&target)
}

fn extract_tar<R: Read>(reader: R, asset_name: &str, dest: &Path) -> Result<()> {
    let corrupt = |e: std::io::Error| FetchError::corrupt(asset_name, e);

    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let member = entry.path().map_err(corrupt)?.into_owned();
        let entry_type = entry.header().entry_type();

        if entry_type.is_pax_global_extensions()
            || entry_type.is_pax_local_extensions()
            || entry_type.is_gnu_longname()
            || entry_type.is_gnu_longlink()
        {
            continue;
        }

        let target = resolve(dest, &member, asset_name)?;

        if entry_type.is_dir() {
            fs::create_dir_all(&target).fs_context(&target)?;
        } else if entry_type.is_file() || entry_type.is_contiguous() {
            let mut data = Vec::new();
            entry.read_to_end(&mut data).map_err(corrupt)?;
            let mode = entry.header().mode().ok();
            write_member(dest, &target, &member, &data, mode, asset_name)?;
        } else if entry_type.is_symlink() || entry_type.is_hard_link() {
            let link = entry
                .link_name()
                .map_err(corrupt)?
                .ok_or_else(|| FetchError::corrupt(asset_name, "link entry without a target"))?
                .into_owned();
            check_link(dest, &member, &link, entry_type.is_hard_link(), asset_name)?;
        } else {
            return Err(FetchError::unsafe_member(
                asset_name,
                &member,
                &format!("is a special file ({entry_type:?})"),
            ));
        }
    }

    Ok(())
}

/// File-type bits of a unix mode; zip only reports dirs and symlinks itself.
const S_IFMT: u32 = 0o170000;
const S_IFREG: u32 = 0o100000;
const S_IFDIR: u32 = 0o040000;

fn extract_zip(buffer: &[u8], asset_name: &str, dest: &Path) -> Result<()> {
    let corrupt = |e: zip::result::ZipError| FetchError::corrupt(asset_name, e);

    let mut archive = zip::ZipArchive::new(Cursor::new(buffer)).map_err(corrupt)?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(corrupt)?;
        let member = PathBuf::from(file.name());
        let target = resolve(dest, &member, asset_name)?;
        let mode = file.unix_mode();
        let kind = mode.map(|m| m & S_IFMT).unwrap_or(0);

        if file.is_dir() || kind == S_IFDIR {
            fs::create_dir_all(&target).fs_context(&target)?;
        } else if file.is_symlink() {
            let mut link = String::new();
            file.read_to_string(&mut link)
                .map_err(|e| FetchError::corrupt(asset_name, e))?;
            check_link(dest, &member, Path::new(&link), false, asset_name)?;
        } else if kind != 0 && kind != S_IFREG {
            return Err(FetchError::unsafe_member(
                asset_name,
                &member,
                &format!("is a special file (mode {:o})", kind),
            ));
        } else {
            let mut data = Vec::new();
            file.read_to_end(&mut data)
                .map_err(|e| FetchError::corrupt(asset_name, e))?;
            write_member(dest, &target, &member, &data, mode, asset_name)?;
        }
    }

    Ok(())
}

fn resolve(dest: &Path, member: &Path, asset_name: &str) -> Result<PathBuf> {
    contained_join(dest, member)
        .map_err(|escape| FetchError::unsafe_member(asset_name, member, escape.reason()))
}

fn write_member(
    dest: &Path,
    target: &Path,
    member: &Path,
    data: &[u8],
    mode: Option<u32>,
    asset_name: &str,
) -> Result<()> {
    if target == dest {
        return Err(FetchError::unsafe_member(asset_name, member, "has an empty path"));
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).fs_context(parent)?;
    }
    fs::write(target, data).fs_context(target)?;

    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(target, fs::Permissions::from_mode(mode & 0o777))
            .fs_context(target)?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

/// Links are never created. One pointing outside `dest` rejects the
/// archive; a contained one is skipped.
fn check_link(
    dest: &Path,
    member: &Path,
    link: &Path,
    hard: bool,
    asset_name: &str,
) -> Result<()> {
    let resolved = if hard {
        contained_join(dest, link)
    } else {
        contained_link_target(dest, member, link)
    };

    match resolved {
        Ok(_) => {
            tracing::warn!(
                "Skipping link {} -> {} in {}",
                member.display(),
                link.display(),
                asset_name
            );
            Ok(())
        }
        Err(escape) => Err(FetchError::unsafe_member(
            asset_name,
            member,
            &format!("links to {} which {}", link.display(), escape.reason()),
        )),
    }
}
