//! Content type inference from file extensions.

/// Content type for files whose extension is unknown.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

fn base_type(extension: &str) -> Option<&'static str> {
    let mime = match extension {
        "htm" | "html" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" | "map" => "application/json",
        "txt" | "text" | "log" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        "mp3" => "audio/mpeg",
        "ogg" | "oga" => "audio/ogg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "ogv" => "video/ogg",
        "vtt" => "text/vtt",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "zip" => "application/zip",
        "epub" => "application/epub+zip",
        _ => return None,
    };
    Some(mime)
}

/// Infer a Content-Type header value from a file name.
///
/// Textual types carry `charset=utf-8`. Unknown or missing extensions map
/// to [`DEFAULT_CONTENT_TYPE`].
pub fn for_filename(name: &str) -> String {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let Some((stem, extension)) = file.rsplit_once('.') else {
        return DEFAULT_CONTENT_TYPE.to_string();
    };
    if stem.is_empty() {
        return DEFAULT_CONTENT_TYPE.to_string();
    }

    match base_type(&extension.to_ascii_lowercase()) {
        Some(mime) if is_textual(mime) => format!("{mime}; charset=utf-8"),
        Some(mime) => mime.to_string(),
        None => DEFAULT_CONTENT_TYPE.to_string(),
    }
}

fn is_textual(mime: &str) -> bool {
    mime.starts_with("text/")
        || matches!(mime, "application/json" | "application/xml" | "image/svg+xml")
}
