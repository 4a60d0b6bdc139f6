use super::lower::{field_type, string_literal};
use super::{CompileError, CompileErrorKind};
use crate::ast::{Annotation, AnnotationValue, LdcValue};
use crate::jvm::class_file::{
    self, Attribute, ConstantIndex, ConstantValue, ConstantsPool, ElementValue, ElementValuePair,
    RuntimeInvisibleAnnotations, RuntimeVisibleAnnotations,
};
use crate::jvm::{BaseType, FieldType};

type Result<T> = std::result::Result<T, CompileErrorKind>;

/// `RuntimeVisibleAnnotations` and `RuntimeInvisibleAnnotations`, when there are any
///
/// Annotations come with the line they were declared on, for error reporting.
pub fn annotation_attributes<'a>(
    constants: &mut ConstantsPool,
    annotations: impl IntoIterator<Item = (usize, &'a Annotation)>,
) -> std::result::Result<Vec<Attribute>, CompileError> {
    let mut visible = vec![];
    let mut invisible = vec![];
    let mut first_line = 0;
    for (line, annotation) in annotations {
        if first_line == 0 {
            first_line = line;
        }
        let encoded = encode_annotation(constants, annotation)
            .map_err(|kind| CompileError::new(line, kind))?;
        if annotation.visible {
            visible.push(encoded);
        } else {
            invisible.push(encoded);
        }
    }

    let at_first = |err: crate::jvm::Error| CompileError::new(first_line, err.into());
    let mut attributes = vec![];
    if !visible.is_empty() {
        let visible = RuntimeVisibleAnnotations(visible);
        attributes.push(constants.get_attribute(visible).map_err(at_first)?);
    }
    if !invisible.is_empty() {
        let invisible = RuntimeInvisibleAnnotations(invisible);
        attributes.push(constants.get_attribute(invisible).map_err(at_first)?);
    }
    Ok(attributes)
}

fn encode_annotation(
    constants: &mut ConstantsPool,
    annotation: &Annotation,
) -> Result<class_file::Annotation> {
    let type_index = constants.get_utf8(format!("L{};", annotation.type_name))?;
    let element_value_pairs = annotation
        .args
        .iter()
        .map(|(name, value)| {
            Ok(ElementValuePair {
                name_index: constants.get_utf8(name.as_str())?,
                value: element_value(constants, value)?,
            })
        })
        .collect::<Result<_>>()?;
    Ok(class_file::Annotation {
        type_index,
        element_value_pairs,
    })
}

fn element_value(constants: &mut ConstantsPool, value: &AnnotationValue) -> Result<ElementValue> {
    let literal = match value {
        AnnotationValue::Enum { type_desc, name } => {
            return Ok(ElementValue::Enum {
                type_name: constants.get_utf8(type_desc.as_str())?,
                const_name: constants.get_utf8(name.as_str())?,
            })
        }
        AnnotationValue::Array(values) => {
            let values = values
                .iter()
                .map(|value| element_value(constants, value))
                .collect::<Result<_>>()?;
            return Ok(ElementValue::Array(values));
        }
        AnnotationValue::Literal(literal) => literal,
    };

    let (tag, value) = match literal {
        LdcValue::Int(int) => (b'I', constants.get_integer(*int)?),
        LdcValue::Long(long) => (b'J', constants.get_long(*long)?),
        LdcValue::Float(float) => (b'F', constants.get_float(*float)?),
        LdcValue::Double(double) => (b'D', constants.get_double(*double)?),
        LdcValue::String(raw) => (b's', constants.get_utf8(string_literal(raw)?)?.0),
        LdcValue::Type(desc) => {
            return Ok(ElementValue::Class(constants.get_utf8(desc.as_str())?));
        }
        LdcValue::Handle(_) => {
            return Err(CompileErrorKind::IllegalOperand(String::from(
                "method handles cannot be annotation values",
            )))
        }
    };
    Ok(ElementValue::Constant { tag, value })
}

/// `ConstantValue` attribute of a field, checking the literal against the field type
pub fn constant_value(
    constants: &mut ConstantsPool,
    desc: &str,
    value: &LdcValue,
) -> Result<Attribute> {
    let mismatch = || {
        CompileErrorKind::IllegalOperand(format!(
            "{} constant cannot initialize a field of type {}",
            value.kind_name(),
            desc
        ))
    };

    let index: ConstantIndex = match (field_type(desc)?, value) {
        (FieldType::Base(base), LdcValue::Int(int)) if base.is_int_like() => {
            constants.get_integer(*int)?
        }
        (FieldType::Base(BaseType::Long), LdcValue::Long(long)) => constants.get_long(*long)?,
        (FieldType::Base(BaseType::Float), LdcValue::Float(float)) => {
            constants.get_float(*float)?
        }
        (FieldType::Base(BaseType::Double), LdcValue::Double(double)) => {
            constants.get_double(*double)?
        }
        (FieldType::Ref(_), LdcValue::String(raw)) if desc == "Ljava/lang/String;" => {
            let utf8 = constants.get_utf8(string_literal(raw)?)?;
            constants.get_string(utf8)?.0
        }
        _ => return Err(mismatch()),
    };
    Ok(constants.get_attribute(ConstantValue(index))?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{Constant, ConstantLookup};

    #[test]
    fn constant_values_match_their_field() {
        let mut constants = ConstantsPool::new();
        assert!(constant_value(&mut constants, "Z", &LdcValue::Int(1)).is_ok());
        assert!(constant_value(&mut constants, "J", &LdcValue::Long(1)).is_ok());
        assert!(constant_value(
            &mut constants,
            "Ljava/lang/String;",
            &LdcValue::String(String::from("hi\\n"))
        )
        .is_ok());
        assert!(constant_value(&mut constants, "J", &LdcValue::Int(1)).is_err());
        assert!(constant_value(&mut constants, "Ljava/lang/Object;", &LdcValue::Int(1)).is_err());

        let strings: Vec<&Constant> = constants
            .constants()
            .iter()
            .map(|(_, _, constant)| constant)
            .filter(|constant| matches!(constant, Constant::String(_)))
            .collect();
        match strings[..] {
            [Constant::String(utf8)] => {
                assert_eq!(constants.constants().utf8(*utf8).unwrap(), "hi\n")
            }
            _ => panic!("expected one string constant, got {:?}", strings),
        }
    }

    #[test]
    fn annotations_split_by_visibility() {
        let mut constants = ConstantsPool::new();
        let annotations = vec![
            Annotation {
                visible: true,
                type_name: String::from("a/Visible"),
                args: vec![(
                    String::from("values"),
                    AnnotationValue::Array(vec![
                        AnnotationValue::Literal(LdcValue::Int(1)),
                        AnnotationValue::Enum {
                            type_desc: String::from("La/E;"),
                            name: String::from("X"),
                        },
                    ]),
                )],
            },
            Annotation {
                visible: false,
                type_name: String::from("a/Hidden"),
                args: vec![],
            },
        ];
        let attributes =
            annotation_attributes(&mut constants, annotations.iter().map(|a| (3, a))).unwrap();
        assert_eq!(attributes.len(), 2);

        let lookup = constants.constants();
        let visible: RuntimeVisibleAnnotations = attributes[0].decode().unwrap();
        assert_eq!(lookup.utf8(visible.0[0].type_index).unwrap(), "La/Visible;");
        assert!(matches!(
            &visible.0[0].element_value_pairs[0].value,
            ElementValue::Array(values) if values.len() == 2
        ));
        let invisible: RuntimeInvisibleAnnotations = attributes[1].decode().unwrap();
        assert_eq!(lookup.utf8(invisible.0[0].type_index).unwrap(), "La/Hidden;");
    }

    #[test]
    fn annotation_errors_point_at_their_line() {
        let mut constants = ConstantsPool::new();
        let fine = Annotation {
            visible: true,
            type_name: String::from("a/Fine"),
            args: vec![],
        };
        let broken = Annotation {
            visible: true,
            type_name: String::from("a/Broken"),
            args: vec![(
                String::from("h"),
                AnnotationValue::Literal(LdcValue::Handle(crate::ast::Handle {
                    kind: crate::jvm::HandleKind::InvokeStatic,
                    owner: String::from("a/B"),
                    name: String::from("f"),
                    desc: String::from("()V"),
                })),
            )],
        };
        let err =
            annotation_attributes(&mut constants, vec![(4, &fine), (9, &broken)]).unwrap_err();
        assert_eq!(err.line, 9);
    }
}
