//! Prompt text for the model-backed stages.

use std::fmt::Write;

use prodcat_core::{Language, Product, ProductCategory};

/// Sent after a prediction that names an unknown or mismatched category.
pub const CORRECTION_MESSAGE: &str = "The predicted_category_id does not exist in the list of candidate categories, or the \
name of the predicted_category_id did not match the predicted_category_name. \
Please provide a corrected response that ensures the predicted category exists \
in the candidate list and matches the predicted name. Include both the corrected \
category ID and name in your response in the same XML format.";

fn push_tag(out: &mut String, tag: &str, value: &str) {
    let _ = writeln!(out, "<{}>{}</{}>", tag, value, tag);
}

fn push_product(out: &mut String, product: &Product) {
    out.push_str("<product>\n");
    push_tag(out, "title", &product.title);
    if let Some(short) = product.short_description.as_deref() {
        push_tag(out, "short_description", short);
    }
    push_tag(out, "description", &product.description);
    if let Some(metadata) = product.metadata.as_deref() {
        push_tag(out, "metadata", metadata);
    }
    out.push_str("</product>\n");
}

/// Ask for a short normalized title as JSON.
pub fn normalization_prompt(product: &Product, language: Language) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "You normalize product listings for a {} catalog. Read the product below and \
         write a short title naming what the product is, using common nouns only. \
         Leave out brands, model numbers, sizes, quantities, colours and marketing language.",
        language
    );
    out.push('\n');
    push_product(&mut out, product);
    out.push_str(
        "\nAnswer with JSON only, in the form {\"normalized_title\": \"<title>\"}. \
         Write the title in the same language as the catalog.",
    );
    out
}

/// List the candidates and ask for one choice in XML.
pub fn categorization_prompt(product: &Product, candidates: &[&ProductCategory]) -> String {
    let mut out = String::from(
        "You are a product taxonomy expert. Choose the single best category for the \
         product below from the candidate categories.\n\n<candidate_categories>\n",
    );

    for category in candidates {
        out.push_str("<category>\n");
        push_tag(&mut out, "id", &category.id);
        push_tag(&mut out, "name", &category.name);
        push_tag(&mut out, "path", &category.formatted_path());
        if let Some(description) = category.description.as_deref() {
            push_tag(&mut out, "description", description);
        }
        if let Some(examples) = category.examples.as_deref().filter(|e| !e.is_empty()) {
            out.push_str("<examples>\n");
            for example in examples {
                out.push_str("<example>\n");
                push_tag(&mut out, "title", &example.title);
                push_tag(&mut out, "description", &example.description);
                out.push_str("</example>\n");
            }
            out.push_str("</examples>\n");
        }
        out.push_str("</category>\n");
    }
    out.push_str("</candidate_categories>\n\n");

    push_product(&mut out, product);
    out.push_str(
        "\nThink through the choice inside <thinking> tags first. Then answer in this format:\n\
         <prediction>\n\
         <predicted_category_id>id of the chosen category</predicted_category_id>\n\
         <predicted_category_name>name of the chosen category</predicted_category_name>\n\
         <explanation>one or two sentences on why it fits</explanation>\n\
         </prediction>\n\
         The id must be one of the candidate ids above and the name must match that id.",
    );
    out
}

/// Ask for attribute values following the category's schema.
pub fn extraction_prompt(
    category: &str,
    subcategory: &str,
    schema_xml: &str,
    product: &Product,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "You extract product attributes for the category \"{}\", subcategory \"{}\".",
        category, subcategory
    );
    out.push_str("\n<attributes_schema>\n");
    out.push_str(schema_xml);
    out.push_str("\n</attributes_schema>\n\n");
    push_product(&mut out, product);
    out.push_str(
        "\nWork out the values in a <scratchpad> first. Only report attributes the product \
         text supports. Then answer in this format:\n\
         <attributes>\n\
         <attribute><name>attribute name</name><value>attribute value</value></attribute>\n\
         </attributes>",
    );
    out
}
