//! Lowers the intermediate AST into elements, a source map, and a referenced-ID set.

use std::collections::BTreeSet;

use crate::elements::{
    instance::InstanceElement, types::ContainerKind, ContainerType, Element, Field, ObjectType,
    Primitive, PrimitiveKind, PrimitiveType, ReferenceExpression, TypeRef, Value,
};
use crate::error::{ParseError, Severity};
use crate::id::{ElemId, IdType};
use crate::parser::ast::{Block, BlockItem, Expr, ExprKind, TemplatePart};
use crate::source_map::SourceMap;

pub struct LowerResult {
    pub elements: Vec<Element>,
    pub source_map: SourceMap,
    pub referenced: BTreeSet<String>,
    pub errors: Vec<ParseError>,
}

/// Parses a type reference written as `adapter.Type` or a bare primitive keyword
/// (`string`/`number`/`boolean`/`unknown`) into an [`ElemId`].
pub fn parse_type_ref(s: &str) -> ElemId {
    match s.split_once('.') {
        Some((adapter, type_name)) => ElemId::top_level_type(adapter, type_name),
        None => ElemId::top_level_type("", s),
    }
}

/// Recognizes a field type written as `list<Inner>` or `map<Inner>`, returning the container
/// kind and the inner type text. Any other text is a plain type reference, not a container.
fn container_kind_from_type_text(s: &str) -> Option<(ContainerKind, &str)> {
    if let Some(inner) = s.strip_prefix("list<").and_then(|rest| rest.strip_suffix('>')) {
        Some((ContainerKind::List, inner))
    } else if let Some(inner) = s.strip_prefix("map<").and_then(|rest| rest.strip_suffix('>')) {
        Some((ContainerKind::Map, inner))
    } else {
        None
    }
}

fn primitive_kind(name: &str) -> Option<PrimitiveKind> {
    match name {
        "string" => Some(PrimitiveKind::String),
        "number" => Some(PrimitiveKind::Number),
        "boolean" => Some(PrimitiveKind::Boolean),
        "unknown" => Some(PrimitiveKind::Unknown),
        _ => None,
    }
}

struct Lower {
    elements: Vec<Element>,
    source_map: SourceMap,
    referenced: BTreeSet<String>,
    errors: Vec<ParseError>,
    seen_container_types: BTreeSet<String>,
}

pub fn lower_file(items: Vec<BlockItem>) -> LowerResult {
    let mut ctx = Lower {
        elements: Vec::new(),
        source_map: SourceMap::new(),
        referenced: BTreeSet::new(),
        errors: Vec::new(),
        seen_container_types: BTreeSet::new(),
    };
    for item in items {
        match item {
            BlockItem::Nested(block) => ctx.lower_top_level_block(block),
            BlockItem::Attribute { key, range, .. } => {
                ctx.errors.push(ParseError {
                    range,
                    message: format!("top-level attribute {key:?} outside any block is not supported"),
                    severity: Severity::Error,
                });
            }
        }
    }
    LowerResult {
        elements: ctx.elements,
        source_map: ctx.source_map,
        referenced: ctx.referenced,
        errors: ctx.errors,
    }
}

impl Lower {
    fn lower_top_level_block(&mut self, block: Block) {
        match block.block_type.as_str() {
            "type" => self.lower_type_block(block),
            "vars" => self.lower_vars_block(block),
            _ => self.lower_instance_block(block),
        }
    }

    fn lower_type_block(&mut self, block: Block) {
        let Some(name) = block.labels.first().cloned() else {
            self.errors.push(ParseError {
                range: block.range,
                message: "type block requires a name label".into(),
                severity: Severity::Error,
            });
            return;
        };
        let elem_id = parse_type_ref(&name);
        let range = block.range.clone();

        let mut attributes = Vec::new();
        let mut field_blocks: Vec<(Block, usize)> = Vec::new();
        for item in block.items {
            match item {
                BlockItem::Attribute { key, value, range } => attributes.push((key, value, range)),
                BlockItem::Nested(inner) => field_blocks.push((inner, 0)),
            }
        }

        if attributes.len() == 1 && attributes[0].0 == "_primitive" && field_blocks.is_empty() {
            let (_, value_expr, _) = attributes.remove(0);
            let kind_name = self.expr_as_literal_string(&value_expr);
            let kind = kind_name.as_deref().and_then(primitive_kind).unwrap_or(PrimitiveKind::Unknown);
            let mut ty = PrimitiveType::new(elem_id.clone(), kind);
            ty.path = None;
            self.source_map.push(elem_id.get_full_name(), range);
            self.elements.push(Element::Primitive(ty));
            return;
        }

        let mut object = ObjectType::new(elem_id.clone());
        let mut seen_fields: Vec<String> = Vec::new();
        for (inner, _) in field_blocks {
            let Some(field_name) = inner.labels.first().cloned() else {
                self.errors.push(ParseError {
                    range: inner.range,
                    message: "field declaration requires a name".into(),
                    severity: Severity::Error,
                });
                continue;
            };
            if seen_fields.contains(&field_name) {
                self.errors.push(ParseError {
                    range: inner.range,
                    message: format!("Attribute redefined: {field_name}"),
                    severity: Severity::Error,
                });
                continue;
            }
            seen_fields.push(field_name.clone());
            let field_type = self.lower_field_type(&inner.block_type);
            let mut field = Field::new(elem_id.clone(), field_name, field_type);
            for inner_item in inner.items {
                if let BlockItem::Attribute { key, value, .. } = inner_item {
                    let lowered = self.lower_expr(value);
                    field.annotations.insert(key, lowered);
                }
            }
            object.fields.insert(field.name.clone(), field);
        }
        for (key, value, _) in attributes {
            if key == "_is_settings" {
                object.is_settings = matches!(
                    self.lower_expr(value),
                    Value::Primitive(Primitive::Boolean(true))
                );
                continue;
            }
            let lowered = self.lower_expr(value);
            object.annotations.insert(key, lowered);
        }
        self.source_map.push(elem_id.get_full_name(), range);
        self.elements.push(Element::Object(object));
    }

    fn lower_vars_block(&mut self, block: Block) {
        let range = block.range.clone();
        for item in block.items {
            if let BlockItem::Attribute { key, value, .. } = item {
                let elem_id = ElemId::new("", "var", IdType::Var, vec![key]);
                let lowered = self.lower_expr(value);
                let mut inst = InstanceElement::new(elem_id.clone(), TypeRef(ElemId::top_level_type("", "var")));
                inst.value.insert("value".to_string(), lowered);
                self.source_map.push(elem_id.get_full_name(), range.clone());
                self.elements.push(Element::Instance(inst));
            }
        }
    }

    fn lower_instance_block(&mut self, block: Block) {
        let type_ref = parse_type_ref(&block.block_type);
        let instance_name = block.labels.first().cloned().unwrap_or_else(|| "_config".to_string());
        let elem_id = ElemId::top_level_instance(type_ref.adapter.clone(), type_ref.type_name.clone(), instance_name);
        let range = block.range.clone();
        let mut inst = InstanceElement::new(elem_id.clone(), TypeRef(type_ref));
        for item in block.items {
            match item {
                BlockItem::Attribute { key, value, .. } => {
                    let lowered = self.lower_expr(value);
                    if crate::elements::instance::INSTANCE_ANNOTATIONS.contains(&key.as_str()) {
                        inst.annotations.insert(key, lowered);
                    } else {
                        inst.value.insert(key, lowered);
                    }
                }
                BlockItem::Nested(inner) => {
                    self.errors.push(ParseError {
                        range: inner.range,
                        message: "nested blocks inside an instance body are not supported; use an object literal".into(),
                        severity: Severity::Warning,
                    });
                }
            }
        }
        self.source_map.push(elem_id.get_full_name(), range);
        self.elements.push(Element::Instance(inst));
    }

    /// Lowers a field's declared type text, registering a synthetic [`Element::Container`] the
    /// first time a given `list<Inner>`/`map<Inner>` shape is seen so later validation can
    /// resolve it like any other type.
    fn lower_field_type(&mut self, type_text: &str) -> TypeRef {
        let Some((kind, inner_text)) = container_kind_from_type_text(type_text) else {
            return TypeRef(parse_type_ref(type_text));
        };
        let inner = TypeRef(parse_type_ref(inner_text));
        let container_id = ElemId::top_level_type("", type_text);
        if self.seen_container_types.insert(container_id.get_full_name()) {
            self.elements.push(Element::Container(container_type_of(kind, inner, container_id.clone())));
        }
        TypeRef(container_id)
    }

    fn expr_as_literal_string(&self, expr: &Expr) -> Option<String> {
        match &expr.kind {
            ExprKind::Template(parts) if parts.len() == 1 => match &parts[0] {
                TemplatePart::Literal(s) => Some(s.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    fn lower_expr(&mut self, expr: Expr) -> Value {
        match expr.kind {
            ExprKind::Number(n) => Value::number(n),
            ExprKind::Boolean(b) => Value::boolean(b),
            ExprKind::Template(parts) => self.lower_template(parts),
            ExprKind::List(items) => {
                Value::List(items.into_iter().map(|i| self.lower_expr(i)).collect())
            }
            ExprKind::Object(entries) => {
                let mut map = std::collections::BTreeMap::new();
                for (key, value) in entries {
                    map.insert(key, self.lower_expr(value));
                }
                Value::Map(map)
            }
            ExprKind::Reference(path) => self.lower_reference(&path),
            ExprKind::Call { name, args } => {
                if name == "file" {
                    if let Some(Expr { kind: ExprKind::Template(parts), .. }) = args.first() {
                        if let [TemplatePart::Literal(path)] = parts.as_slice() {
                            // Content hash is filled in later by the file source, which has
                            // access to the workspace's static-files directory.
                            return Value::Primitive(Primitive::String(path.clone()));
                        }
                    }
                }
                Value::Primitive(Primitive::String(format!("{name}(...)")))
            }
            ExprKind::Dynamic => Value::Primitive(Primitive::String("*".to_string())),
        }
    }

    fn lower_template(&mut self, parts: Vec<TemplatePart>) -> Value {
        if let [TemplatePart::Reference(path)] = parts.as_slice() {
            return self.lower_reference(path);
        }
        let mut out = String::new();
        for part in parts {
            match part {
                TemplatePart::Literal(s) => out.push_str(&s),
                TemplatePart::Reference(path) => {
                    self.record_reference(&path);
                    out.push_str(&format!("${{{}}}", path.join(".")));
                }
            }
        }
        Value::string(out)
    }

    fn lower_reference(&mut self, path: &[String]) -> Value {
        self.record_reference(path);
        let target = if path.len() >= 2 {
            ElemId::new(path[0].clone(), path[1].clone(), IdType::Field, path[2..].to_vec())
        } else {
            ElemId::new("", path.first().cloned().unwrap_or_default(), IdType::Var, Vec::new())
        };
        Value::Reference(ReferenceExpression::new(target))
    }

    fn record_reference(&mut self, path: &[String]) {
        if path.len() >= 2 {
            let full = if path.len() == 2 {
                format!("{}.{}", path[0], path[1])
            } else {
                format!("{}.{}.field.{}", path[0], path[1], path[2..].join("."))
            };
            self.referenced.insert(full);
        }
    }
}

fn container_type_of(kind: ContainerKind, inner: TypeRef, elem_id: ElemId) -> ContainerType {
    match kind {
        ContainerKind::List => ContainerType::list(elem_id, inner),
        ContainerKind::Map => ContainerType::map(elem_id, inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::grammar::Parser;
    use std::path::Path;

    fn lower(text: &str) -> LowerResult {
        let mut p = Parser::new(Path::new("a.nacl"), text, false);
        let items = p.parse_file();
        let mut result = lower_file(items);
        result.errors.extend(p.errors);
        result
    }

    #[test]
    fn lowers_object_type_with_a_string_field() {
        let result = lower("type salesforce.Account {\n  string Name {\n  }\n}");
        assert_eq!(result.elements.len(), 1);
        let Element::Object(obj) = &result.elements[0] else { panic!("expected object type") };
        assert_eq!(obj.elem_id.get_full_name(), "salesforce.Account");
        assert!(obj.fields.contains_key("Name"));
        assert!(result.source_map.contains("salesforce.Account"));
    }

    #[test]
    fn lowers_instance_with_attribute_values() {
        let result = lower("salesforce.Account acme {\n  Name = \"Acme\"\n}");
        assert_eq!(result.elements.len(), 1);
        let Element::Instance(inst) = &result.elements[0] else { panic!("expected instance") };
        assert_eq!(inst.elem_id.get_full_name(), "salesforce.Account.instance.acme");
        assert_eq!(inst.value.get("Name"), Some(&Value::string("Acme")));
    }

    #[test]
    fn list_field_type_lowers_to_a_container_element() {
        let result = lower("type x.T {\n  list<string> Tags {\n  }\n}");
        let Element::Object(obj) = &result.elements[0] else { panic!("expected object type") };
        let field = obj.fields.get("Tags").expect("Tags field");
        assert_eq!(field.field_type.0.get_full_name(), "list<string>");
        let container = result
            .elements
            .iter()
            .find_map(|e| e.as_container())
            .expect("container element lowered");
        assert_eq!(container.kind, crate::elements::types::ContainerKind::List);
        assert_eq!(container.inner.0.get_full_name(), "string");
    }

    #[test]
    fn reference_expression_is_recorded_in_referenced_set() {
        let result = lower("x.T inst {\n  ref = x.T.missing\n}");
        assert!(result.referenced.contains("x.T.field.missing"));
    }

    #[test]
    fn hidden_value_attribute_becomes_an_annotation_not_a_value_entry() {
        let result = lower("x.T inst {\n  _hidden_value = true\n  a = 1\n}");
        let Element::Instance(inst) = &result.elements[0] else { panic!() };
        assert!(inst.annotations.contains_key("_hidden_value"));
        assert!(!inst.value.contains_key("_hidden_value"));
        assert!(inst.value.contains_key("a"));
    }
}
