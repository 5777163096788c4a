/// Trims `value` and cuts it to at most `max_chars` characters.
pub fn clamp_text(value: &str, max_chars: usize) -> String {
	let trimmed = value.trim();

	match trimmed.char_indices().nth(max_chars) {
		Some((idx, _)) => trimmed[..idx].to_string(),
		None => trimmed.to_string(),
	}
}

pub fn char_len(value: &str) -> usize {
	value.trim().chars().count()
}

/// Collapses internal whitespace runs to single spaces.
pub fn collapse_whitespace(value: &str) -> String {
	value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clamps_on_char_boundaries() {
		assert_eq!(clamp_text("  héllo wörld ", 7), "héllo w");
		assert_eq!(clamp_text("short", 10), "short");
		assert_eq!(clamp_text("", 3), "");
	}

	#[test]
	fn collapses_whitespace_runs() {
		assert_eq!(collapse_whitespace("  Org \t  Name\n"), "Org Name");
	}
}
