use crate::models::NodeWithScore;

pub const QA_PROMPT_TEMPLATE: &str = "Context information is below.\n\
---------------------\n\
{context_str}\n\
---------------------\n\
Given the context information above I want you to think step by step to answer the query in a crisp manner, incase case you don't know the answer say 'I don't know!'.\n\
Query: {query_str}\n\
Answer: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn qa() -> Self {
        Self::new(QA_PROMPT_TEMPLATE)
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fills both slots in one pass, so placeholder text inside the context or the query stays literal.
    pub fn format(&self, context_str: &str, query_str: &str) -> String {
        const CONTEXT: &str = "{context_str}";
        const QUERY: &str = "{query_str}";

        let mut prompt =
            String::with_capacity(self.template.len() + context_str.len() + query_str.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find('{') {
            prompt.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix(CONTEXT) {
                prompt.push_str(context_str);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUERY) {
                prompt.push_str(query_str);
                rest = after;
            } else {
                prompt.push('{');
                rest = &tail[1..];
            }
        }
        prompt.push_str(rest);
        prompt
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(
            "Context information is below.\n---------------------\n{context_str}\n---------------------\n\
Given the context information and not prior knowledge, answer the query.\nQuery: {query_str}\nAnswer: ",
        )
    }
}

pub fn render_context(nodes: &[NodeWithScore]) -> String {
    nodes
        .iter()
        .map(|hit| format!("{}\n\n{}", hit.node.metadata.render(), hit.node.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
