//! Prompt sent to the language model for query translation.

use std::fmt::Write;

use selfquery_core::{AttributeInfo, Comparator, Operator};

use crate::parser::NO_FILTER;

fn list_names<T: Copy>(items: &[T], name: impl Fn(T) -> &'static str) -> String {
    items.iter().map(|i| format!("`{}`", name(*i))).collect::<Vec<_>>().join(", ")
}

/// Render the schema as a JSON object keyed by attribute name.
fn schema_block(schema: &[AttributeInfo]) -> String {
    let attrs: serde_json::Map<String, serde_json::Value> = schema
        .iter()
        .map(|a| {
            (
                a.name.clone(),
                serde_json::json!({ "type": a.attr_type.as_str(), "description": a.description }),
            )
        })
        .collect();
    serde_json::to_string_pretty(&attrs).unwrap_or_default()
}

pub fn build_prompt(query: &str, document_contents: &str, schema: &[AttributeInfo], enable_limit: bool) -> String {
    let mut p = String::new();
    p.push_str(
        "Your goal is to structure the user's query to match the request schema provided below.\n\n\
         << Structured Request Schema >>\n\
         When responding use a markdown code snippet with a JSON object formatted in the following schema:\n\n\
         ```json\n{\n",
    );
    p.push_str("    \"query\": string \\ text string to compare to document contents\n");
    p.push_str("    \"filter\": string \\ logical condition statement for filtering documents\n");
    if enable_limit {
        p.push_str("    \"limit\": int \\ the number of documents to retrieve\n");
    }
    p.push_str("}\n```\n\n");

    let _ = write!(
        p,
        "The query string should contain only text that is expected to match the contents of documents. \
         Any conditions in the filter should not be mentioned in the query as well.\n\n\
         A logical condition statement is composed of one or more comparison and logical operation statements.\n\n\
         A comparison statement takes the form: `comp(attr, val)`:\n\
         - `comp` ({}): comparator\n\
         - `attr` (string): name of attribute to apply the comparison to, in double quotes\n\
         - `val`: the comparison value; a string in double quotes, a number, true/false, \
         a list `[...]` for `in`/`nin`, or `date(\"YYYY-MM-DD\")`\n\n\
         A logical operation statement takes the form `op(statement1, statement2, ...)`:\n\
         - `op` ({}): logical operator\n\
         - `statement1`, `statement2`, ... (comparison statements or logical operation statements): \
         one or more statements to apply the operation to\n\n\
         Make sure that you only use the comparators and logical operators listed above and no others.\n\
         Make sure that filters only refer to attributes that exist in the data source.\n\
         Make sure that filters take into account the descriptions of attributes and only make comparisons \
         that are feasible given the type of data being stored.\n\
         Make sure that filters are only used as needed. If there are no filters that should be applied \
         return \"{NO_FILTER}\" for the filter value.\n",
        list_names(&Comparator::ALL, Comparator::as_str),
        list_names(&Operator::ALL, Operator::as_str),
    );
    if enable_limit {
        p.push_str(
            "Make sure the `limit` is always a positive integer. It is an optional parameter so leave it \
             null if it does not make sense.\n",
        );
    }

    let _ = write!(
        p,
        "\n<< Data Source >>\n```json\n{{\n    \"content\": \"{}\",\n    \"attributes\": {}\n}}\n```\n\n\
         << User Query >>\n{query}\n\n<< Structured Request >>\n",
        document_contents.replace('"', "\\\""),
        schema_block(schema).replace('\n', "\n    "),
    );
    p
}
