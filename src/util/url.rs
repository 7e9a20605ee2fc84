use url::{ParseError, Url};

/// Parse `raw` puis normalise son chemin : les segments `.` et `..` sont
/// résolus et les slashs répétés fusionnés. Le slash final est conservé.
///
/// # Errors
///
/// Retourne l'erreur de parsing si `raw` n'est pas une URL absolue.
pub fn normalize_url(raw: &str) -> Result<Url, ParseError> {
    let mut url = Url::parse(raw)?;
    if url.cannot_be_a_base() {
        return Ok(url);
    }

    let normalized = {
        let path = url.path();
        let trailing = path.len() > 1 && path.ends_with('/');
        let mut segments: Vec<&str> = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                other => segments.push(other),
            }
        }
        let mut joined = format!("/{}", segments.join("/"));
        if trailing && !segments.is_empty() {
            joined.push('/');
        }
        joined
    };

    url.set_path(&normalized);
    Ok(url)
}
