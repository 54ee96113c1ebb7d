/// Clean up a raw image list: trim spaces, drop blank lines and `#` comments.
/// Order is kept and duplicates are not removed.
pub fn normalize<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| {
            let image = line.as_ref().trim_matches(' ');
            if image.is_empty() || image.starts_with('#') {
                None
            } else {
                Some(image.to_string())
            }
        })
        .collect()
}
