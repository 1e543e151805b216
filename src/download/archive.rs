use anyhow::{anyhow, Context};
use indicatif::ProgressBar;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// File name of the archive, the last segment of the URL path.
pub fn archive_file_name(url: &str) -> anyhow::Result<String> {
    let parsed = reqwest::Url::parse(url)?;
    parsed
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Could not derive a file name from URL {}", url))
}

pub fn download_archive(url: &str, output_filepath: &Path) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .user_agent("vector-join")
        .build()?;
    let response = client.get(url).send()?.error_for_status()?;
    let bar = match response.content_length() {
        Some(length) => ProgressBar::new(length),
        None => ProgressBar::new_spinner(),
    };
    // Download next to the target first so an interrupted download is never mistaken for a cached one.
    let partial_filepath = output_filepath.with_extension("part");
    let mut file = fs::File::create(&partial_filepath)?;
    io::copy(&mut bar.wrap_read(response), &mut file)
        .with_context(|| format!("Downloading {}", url))?;
    bar.finish_and_clear();
    fs::rename(&partial_filepath, output_filepath)?;
    Ok(())
}

pub fn sync_archive_to_file(url: &str, output_dir: &Path) -> anyhow::Result<PathBuf> {
    let filename = archive_file_name(url)?;
    let output_filepath = output_dir.join(filename);
    if output_filepath.exists() {
        log::info!(
            "Local file exists for {}: {:?}",
            url,
            output_filepath.canonicalize()
        );
        return Ok(output_filepath);
    }

    log::info!("Downloading {}", url);
    download_archive(url, &output_filepath)?;
    Ok(output_filepath)
}

/// Unpack a zip archive into `output_dir`, overwriting files that already exist.
pub fn extract_archive(archive_filepath: &Path, output_dir: &Path) -> anyhow::Result<()> {
    let file = fs::File::open(archive_filepath)
        .with_context(|| format!("Opening archive {:?}", archive_filepath))?;
    let mut archive = zip::ZipArchive::new(file)?;
    fs::create_dir_all(output_dir)?;
    archive.extract(output_dir)?;
    log::info!(
        "Extracted {} files from {:?} to {:?}",
        archive.len(),
        archive_filepath,
        output_dir
    );
    Ok(())
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// Find the geofile to read below `dir`: the file called `file_name` if given, otherwise the only shapefile.
pub fn find_geofile(dir: &Path, file_name: Option<&str>) -> anyhow::Result<PathBuf> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();
    let matches: Vec<PathBuf> = files
        .into_iter()
        .filter(|path| match file_name {
            Some(file_name) => path.file_name().and_then(|name| name.to_str()) == Some(file_name),
            None => path
                .extension()
                .and_then(|extension| extension.to_str())
                .map_or(false, |extension| extension.eq_ignore_ascii_case("shp")),
        })
        .collect();
    match matches.as_slice() {
        [single] => Ok(single.clone()),
        [] => Err(anyhow!(
            "No {} found in {:?}",
            file_name.unwrap_or("shapefile"),
            dir
        )),
        [first, ..] => {
            if file_name.is_none() {
                return Err(anyhow!(
                    "Found {} shapefiles in {:?}, name the one to read",
                    matches.len(),
                    dir
                ));
            }
            log::warn!(
                "Found {} files named like {:?}, using {:?}",
                matches.len(),
                file_name,
                first
            );
            Ok(first.clone())
        }
    }
}
