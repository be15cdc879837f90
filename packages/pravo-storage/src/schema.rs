pub fn render_schema(vector_dim: u32, text_search_config: &str) -> String {
	let init = include_str!("../../../sql/init.sql");
	let expanded = expand_includes(init);

	expanded
		.replace("<VECTOR_DIM>", &vector_dim.to_string())
		.replace("<TEXT_SEARCH_CONFIG>", text_search_config)
}

/// Text search configurations are interpolated into DDL, so only `[a-z_]+` is accepted.
pub fn is_valid_text_search_config(name: &str) -> bool {
	!name.is_empty() && name.chars().all(|c| c.is_ascii_lowercase() || c == '_')
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"00_extensions.sql" => out.push_str(include_str!("../../../sql/00_extensions.sql")),
				"tables/001_rules.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_rules.sql")),
				"tables/002_rule_chunks.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_rule_chunks.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rendered_schema_has_no_placeholders_or_includes() {
		let sql = render_schema(1_024, "russian");

		assert!(!sql.contains("<VECTOR_DIM>"));
		assert!(!sql.contains("<TEXT_SEARCH_CONFIG>"));
		assert!(!sql.contains("\\ir "));
		assert!(sql.contains("vector(1024)"));
		assert!(sql.contains("to_tsvector('russian'::regconfig, chunk_text)"));
	}

	#[test]
	fn rules_table_precedes_chunks_table() {
		let sql = render_schema(4, "simple");
		let rules = sql.find("CREATE TABLE IF NOT EXISTS rules").expect("Missing rules table.");
		let chunks =
			sql.find("CREATE TABLE IF NOT EXISTS rule_chunks").expect("Missing rule_chunks table.");

		assert!(rules < chunks);
	}

	#[test]
	fn text_search_config_accepts_identifiers_only() {
		assert!(is_valid_text_search_config("russian"));
		assert!(is_valid_text_search_config("pg_catalog_simple"));
		assert!(!is_valid_text_search_config(""));
		assert!(!is_valid_text_search_config("Russian"));
		assert!(!is_valid_text_search_config("russian'); --"));
	}
}
