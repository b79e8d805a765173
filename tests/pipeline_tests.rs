//! End-to-end pipeline tests.
//!
//! Each test builds a small class universe by hand, runs a DSL pipeline
//! through a `Context`, and checks the resulting traces, entities or model.

use archsight::config::AnalysisConfig;
use archsight::context::Context;
use archsight::dsl::{template, ScopeBuilder};
use archsight::element::{
    AnnotationDecl, AnnotationValue, ClassDecl, Element, FieldAccessKind, FieldDecl, Instruction,
    MethodDecl, MethodRef, ParameterDecl, TypeSignature,
};
use archsight::entity::{LabelFormatter, BACKTRACK};
use archsight::error::ArchError;
use archsight::measure::ScopeKind;
use archsight::model::{EntityRecord, SystemModel};
use archsight::value::PropertyValue;

const CONTROLLER: &str = "org/springframework/stereotype/Controller";
const GET_MAPPING: &str = "org/springframework/web/bind/annotation/GetMapping";

// ============================================================================
// Fixtures
// ============================================================================

fn web_app() -> Vec<ClassDecl> {
    vec![
        ClassDecl::new("shop/web/OrderController")
            .with_annotation(AnnotationDecl::new(CONTROLLER))
            .with_method(MethodDecl::constructor())
            .with_method(
                MethodDecl::new("list", "()Ljava/util/List;").with_annotation(
                    AnnotationDecl::new(GET_MAPPING).with_value(
                        "value",
                        AnnotationValue::Array(vec![AnnotationValue::Str("/orders".into())]),
                    ),
                ),
            )
            .with_method(
                MethodDecl::new("show", "(J)Lshop/Order;")
                    .with_annotation(
                        AnnotationDecl::new(GET_MAPPING)
                            .with_value("value", AnnotationValue::Str("/orders/{id}".into())),
                    )
                    .with_parameter(ParameterDecl::new("id", "J")),
            ),
        ClassDecl::new("shop/web/HealthController")
            .with_annotation(AnnotationDecl::new(CONTROLLER))
            .with_method(
                MethodDecl::new("ping", "()V").with_annotation(
                    AnnotationDecl::new(GET_MAPPING)
                        .with_value("value", AnnotationValue::Str("/ping".into())),
                ),
            ),
        ClassDecl::new("shop/Order")
            .with_field(FieldDecl::new("id", "J"))
            .with_field(FieldDecl::new("total", "Ljava/math/BigDecimal;")),
    ]
}

fn run(classes: Vec<ClassDecl>, pipeline: archsight::action::Chain) -> SystemModel {
    let mut ctx = Context::new(classes, AnalysisConfig::default());
    ctx.execute(&pipeline.into()).unwrap();
    ctx.into_model()
}

fn by_label<'a>(model: &'a SystemModel, entity_type: &str, label: &str) -> &'a EntityRecord {
    model
        .entities_of_type(&entity_type.into())
        .find(|r| r.label == label)
        .unwrap_or_else(|| panic!("no {} labeled {}", entity_type, label))
}

fn controllers_and_endpoints() -> archsight::action::Chain {
    template(|t| {
        t.classes(|c| {
            c.annotated(CONTROLLER).entity("controller").methods(|m| {
                m.annotated(GET_MAPPING)
                    .entity("endpoint")
                    .relate("controller", "endpoints", "endpoint");
            });
        });
    })
}

// ============================================================================
// Traces
// ============================================================================

mod trace_tests {
    use super::*;

    fn trace_counts(ctx: &Context) -> Vec<(Element, usize)> {
        let store = ctx.store();
        let mut counts = Vec::new();
        for class in store.class_ids() {
            let class_node = store.class(class);
            let elements = std::iter::once(Element::Class(class))
                .chain(class_node.methods.iter().map(|m| Element::Method(*m)))
                .chain(class_node.fields.iter().map(|f| Element::Field(*f)));
            for element in elements {
                counts.push((element, ctx.traces().traces(store, element).len()));
            }
        }
        counts
    }

    #[test]
    fn traces_only_grow_and_never_subsume() {
        let mut ctx = Context::new(web_app(), AnalysisConfig::default());

        let first = template(|t| {
            t.classes(|c| {
                c.methods(|m| {
                    m.parameters(|_| {});
                });
            });
        });
        ctx.execute(&first.into()).unwrap();
        let before = trace_counts(&ctx);

        // reach the same members again through a different root
        let second = template(|t| {
            t.classes_named("Order", |c| {
                c.fields(|_| {}).methods(|m| {
                    m.owner(|o| {
                        o.methods(|_| {});
                    });
                });
            });
        });
        ctx.execute(&second.into()).unwrap();
        let after = trace_counts(&ctx);

        for ((element, old), (_, new)) in before.iter().zip(&after) {
            assert!(new >= old, "{:?} lost traces", element);
        }

        let store = ctx.store();
        for (element, _) in after {
            let traces = ctx.traces().traces(store, element);
            for (i, a) in traces.iter().enumerate() {
                for (j, b) in traces.iter().enumerate() {
                    if i != j {
                        assert!(!a.is_subset_of(b), "{:?} keeps a subsumed trace", element);
                    }
                }
            }
        }
    }

    #[test]
    fn member_traces_end_at_their_class() {
        let mut ctx = Context::new(web_app(), AnalysisConfig::default());
        let pipeline = template(|t| {
            t.classes(|c| {
                c.methods(|m| {
                    m.parameters(|_| {});
                });
            });
        });
        ctx.execute(&pipeline.into()).unwrap();

        let store = ctx.store();
        let order_controller = store.class_by_name("shop/web/OrderController").unwrap();
        let show = store
            .find_method(order_controller, "show", None)
            .unwrap()
            .unwrap();
        let id = store.method(show).parameters[0];

        let paths = ctx.traces_of(Element::Parameter(id));
        assert_eq!(
            paths,
            vec![vec![
                Element::Parameter(id),
                Element::Method(show),
                Element::Class(order_controller),
            ]]
        );
    }
}

// ============================================================================
// Entities and relations
// ============================================================================

mod entity_tests {
    use super::*;

    #[test]
    fn registering_twice_yields_one_entity() {
        let model = run(
            web_app(),
            template(|t| {
                t.classes(|c| {
                    c.annotated(CONTROLLER).entity("controller").entity("controller");
                });
                t.classes(|c| {
                    c.annotated(CONTROLLER).entity("controller");
                });
            }),
        );
        assert_eq!(model.entities_of_type(&"controller".into()).count(), 2);
    }

    #[test]
    fn second_type_on_bound_element_is_rejected() {
        let mut ctx = Context::new(web_app(), AnalysisConfig::default());
        let as_a = template(|t| {
            t.classes_named("OrderController$", |c| {
                c.entity("a");
            });
        });
        let as_b = template(|t| {
            t.classes_named("OrderController$", |c| {
                c.entity("b");
            });
        });

        ctx.execute(&as_a.clone().into()).unwrap();
        ctx.execute(&as_a.into()).unwrap();
        let err = ctx.execute(&as_b.into()).unwrap_err();
        assert!(matches!(
            err,
            ArchError::UniqueElementPerEntityViolation { .. }
        ));
    }

    #[test]
    fn lenient_registry_rebinds() {
        let mut ctx = Context::new(
            web_app(),
            AnalysisConfig::default().with_strict_entities(false),
        );
        for entity_type in ["a", "b", "a"] {
            let pipeline = template(|t| {
                t.classes_named("OrderController$", |c| {
                    c.entity(entity_type);
                });
            });
            ctx.execute(&pipeline.into()).unwrap();
        }
        let store = ctx.store();
        let class = store.class_by_name("shop/web/OrderController").unwrap();
        let bound = ctx.entities().entity_of(Element::Class(class)).unwrap();
        assert_eq!(ctx.entities().entity(bound).entity_type.as_str(), "a");

        let model = ctx.into_model();
        assert_eq!(model.entities_of_type(&"a".into()).count(), 1);
        assert_eq!(model.entities_of_type(&"b".into()).count(), 0);
        assert_eq!(model.len(), 1);
    }

    fn disjoint_relation(relate_from: &'static str) -> archsight::action::Chain {
        template(|t| {
            t.classes_named("OrderController$", |c| {
                c.entity("controller");
            });
            t.classes_named("HealthController$", |c| {
                c.methods(|m| {
                    m.entity("endpoint");
                });
            });
            t.classes_named(relate_from, |c| {
                c.relate("controller", "endpoints", "endpoint");
            });
        })
    }

    #[test]
    fn relation_without_common_trace_is_unresolved() {
        let mut ctx = Context::new(web_app(), AnalysisConfig::default());
        let err = ctx
            .execute(&disjoint_relation("HealthController$").into())
            .unwrap_err();
        assert!(matches!(
            err,
            ArchError::UnresolvedParentRelation { ref parent, ref key, ref child }
                if parent == "controller" && key == "endpoints" && child == "endpoint"
        ));
    }

    #[test]
    fn relation_over_empty_scope_is_not_unresolved() {
        let model = run(web_app(), disjoint_relation("NoSuchClass$"));
        let controller = by_label(&model, "controller", "OrderController");
        assert_eq!(model.children_of(controller.id, "endpoints").count(), 0);
        assert_eq!(model.entities_of_type(&"endpoint".into()).count(), 1);
    }

    #[test]
    fn relations_link_both_ways() {
        let model = run(web_app(), controllers_and_endpoints());

        let orders = by_label(&model, "controller", "OrderController");
        let endpoints: Vec<&str> = model
            .children_of(orders.id, "endpoints")
            .map(|r| r.label.as_str())
            .collect();
        assert_eq!(endpoints, vec!["list", "show"]);

        for endpoint in model.entities_of_type(&"endpoint".into()) {
            let parents = endpoint.children(BACKTRACK);
            assert_eq!(parents.len(), 1, "{} backtrack", endpoint.label);
            let parent = model.entity(parents[0]).unwrap();
            assert_eq!(parent.entity_type.as_str(), "controller");
        }

        let health = by_label(&model, "controller", "HealthController");
        assert_eq!(model.children_of(health.id, "endpoints").count(), 1);
    }

    #[test]
    fn relation_can_be_declared_before_registration() {
        // wire first, register later: types are checked for the whole tree
        let model = run(
            web_app(),
            template(|t| {
                t.classes(|c| {
                    c.annotated(CONTROLLER).entity("controller").methods(|m| {
                        m.scope_if_entity_exists("endpoint", true, |m| {
                            m.relate("controller", "endpoints", "endpoint");
                        })
                        .annotated(GET_MAPPING)
                        .entity("endpoint");
                    });
                });
                t.classes(|c| {
                    c.annotated(CONTROLLER).methods(|m| {
                        m.has_entity("endpoint")
                            .relate("controller", "endpoints", "endpoint");
                    });
                });
            }),
        );
        let orders = by_label(&model, "controller", "OrderController");
        assert_eq!(orders.children("endpoints").len(), 2);
    }

    #[test]
    fn unknown_relation_is_rejected_before_any_element_is_visited() {
        let mut ctx = Context::new(web_app(), AnalysisConfig::default().with_profile(true));
        let pipeline = template(|t| {
            t.classes(|c| {
                c.entity("foo").relate("foo", "x", "bar");
            });
        });
        let err = ctx.execute(&pipeline.into()).unwrap_err();
        assert!(matches!(err, ArchError::EntityNotRegistered { .. }));
        assert!(ctx.entities().is_empty());
        assert!(ctx.measurements().is_empty());
    }

    #[test]
    fn child_without_parent_is_not_found() {
        let mut ctx = Context::new(web_app(), AnalysisConfig::default());
        let pipeline = template(|t| {
            t.classes_named("Order$", |c| {
                c.entity("aggregate");
            });
            t.classes(|c| {
                c.annotated(CONTROLLER).entity("controller");
            });
            t.classes_named("Order$", |c| {
                c.relate("controller", "uses", "aggregate");
            });
        });
        assert!(matches!(
            ctx.execute(&pipeline.into()),
            Err(ArchError::EntityNotFound { .. })
        ));
    }
}

// ============================================================================
// Properties and labels
// ============================================================================

mod property_tests {
    use super::*;

    #[test]
    fn annotation_values_become_properties_and_labels() {
        let model = run(
            web_app(),
            template(|t| {
                t.classes(|c| {
                    c.annotated(CONTROLLER)
                        .entity_with_label(
                            "controller",
                            LabelFormatter::Template("${name} (${layer})".into()),
                        )
                        .set_property("layer", "web")
                        .methods(|m| {
                            m.annotated(GET_MAPPING)
                                .entity_with_label("endpoint", LabelFormatter::Property("path".into()))
                                .annotation_field(GET_MAPPING, "value", |v| {
                                    v.property("path");
                                })
                                .read_name(|v| {
                                    v.prefix("GET ").property_of(
                                        "controller",
                                        "operations",
                                        Default::default(),
                                    );
                                });
                        });
                });
            }),
        );

        let orders = by_label(&model, "controller", "OrderController (web)");
        assert_eq!(
            orders.property("operations"),
            &[
                PropertyValue::Str("GET list".into()),
                PropertyValue::Str("GET show".into())
            ]
        );
        by_label(&model, "endpoint", "/orders");
        by_label(&model, "endpoint", "/orders/{id}");
        by_label(&model, "endpoint", "/ping");
    }

    #[test]
    fn property_without_entity_is_not_found() {
        let mut ctx = Context::new(web_app(), AnalysisConfig::default());
        let pipeline = template(|t| {
            t.classes(|c| {
                c.set_property("layer", "web");
            });
        });
        assert!(matches!(
            ctx.execute(&pipeline.into()),
            Err(ArchError::EntityNotFound { .. })
        ));
    }
}

// ============================================================================
// Generic signatures
// ============================================================================

mod signature_tests {
    use super::*;

    fn repository() -> Vec<ClassDecl> {
        let returned = TypeSignature::generic(
            "java/util/Map",
            vec![
                TypeSignature::new("java/lang/String"),
                TypeSignature::generic(
                    "java/util/List",
                    vec![TypeSignature::generic(
                        "kotlin/Pair",
                        vec![
                            TypeSignature::new("shop/Payload"),
                            TypeSignature::new("java/lang/Integer"),
                        ],
                    )],
                ),
            ],
        );
        vec![
            ClassDecl::new("shop/Repository").with_method(
                MethodDecl::new("grouped", "()Ljava/util/Map;").with_return_signature(returned),
            ),
            ClassDecl::new("shop/Payload"),
            ClassDecl::new("java/lang/String"),
            ClassDecl::new("java/lang/Integer"),
        ]
    }

    #[test]
    fn pattern_and_hand_written_descent_find_the_same_entities() {
        let compiled = template(|t| {
            t.classes(|c| {
                c.methods(|m| {
                    m.return_type_t("Map<_, List<Pair<T, _>>>", |c| {
                        c.entity("payload");
                    })
                    .unwrap();
                });
            });
        });
        let manual = template(|t| {
            t.classes(|c| {
                c.methods(|m| {
                    m.return_signature(|s| {
                        s.filter_type("Map").type_argument(1, |s| {
                            s.filter_type("List").type_argument(0, |s| {
                                s.filter_type("Pair").type_argument(0, |s| {
                                    s.explode_type(|c| {
                                        c.entity("payload");
                                    });
                                });
                            });
                        });
                    });
                });
            });
        });
        assert_eq!(compiled, manual);

        let model = run(repository(), compiled);
        let labels: Vec<&str> = model
            .entities_of_type(&"payload".into())
            .map(|r| r.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Payload"]);
    }

    #[test]
    fn mismatched_raw_type_finds_nothing() {
        let model = run(
            repository(),
            template(|t| {
                t.classes(|c| {
                    c.methods(|m| {
                        m.return_type_t("Map<_, Set<Pair<T, _>>>", |c| {
                            c.entity("payload");
                        })
                        .unwrap();
                    });
                });
            }),
        );
        assert!(model.is_empty());
    }
}

// ============================================================================
// Resolvers
// ============================================================================

mod resolver_tests {
    use super::*;

    fn handler(body: MethodDecl) -> Vec<ClassDecl> {
        vec![
            ClassDecl::new("shop/OrderHandler")
                .with_method(body)
                .with_method(
                    MethodDecl::new("lambda$handle$0", "()V")
                        .with_instruction(Instruction::New {
                            type_name: "shop/OrderPlaced".into(),
                        })
                        .with_instruction(Instruction::invoke_special(
                            "shop/OrderPlaced",
                            "<init>",
                            "()V",
                        )),
                )
                .with_method(MethodDecl::new("later", "(Ljava/lang/Runnable;)V")),
            ClassDecl::new("shop/OrderPlaced").with_method(MethodDecl::constructor()),
        ]
    }

    fn instantiations() -> archsight::action::Chain {
        template(|t| {
            t.classes_named("OrderPlaced$", |c| {
                c.entity("event");
            });
            t.classes_named("OrderHandler$", |c| {
                c.methods(|m| {
                    m.named("^handle$")
                        .entity("handler")
                        .instantiations_of("handler", "emits", "event");
                });
            });
        })
    }

    fn assert_single_edge(model: &SystemModel) {
        let handler = by_label(model, "handler", "handle");
        let event = by_label(model, "event", "OrderPlaced");
        assert_eq!(handler.children("emits"), &[event.id]);
        assert_eq!(event.children(BACKTRACK), &[handler.id]);
    }

    #[test]
    fn direct_constructor_call_links_once() {
        let body = MethodDecl::new("handle", "()V")
            .with_instructions(Instruction::construct("shop/OrderPlaced", "()V"));
        let model = run(handler(body), instantiations());
        assert_single_edge(&model);
    }

    #[test]
    fn constructor_inside_lambda_links_once() {
        let body = MethodDecl::new("handle", "()V")
            .with_instruction(Instruction::invoke_dynamic(
                "java/lang/Runnable",
                "run",
                Some(MethodRef::new("shop/OrderHandler", "lambda$handle$0", "()V")),
            ))
            .with_instruction(Instruction::invoke_virtual(
                "shop/OrderHandler",
                "later",
                "(Ljava/lang/Runnable;)V",
            ));
        let model = run(handler(body), instantiations());
        assert_single_edge(&model);
    }

    #[test]
    fn super_constructor_chain_is_not_an_instantiation() {
        let body = MethodDecl::new("handle", "()V")
            .with_instructions(Instruction::construct("shop/OrderPlaced", "()V"));
        let mut classes = handler(body);
        classes[1] = ClassDecl::new("shop/OrderPlaced")
            .with_super("shop/DomainEvent")
            .with_method(MethodDecl::constructor().with_instruction(Instruction::invoke_special(
                "shop/DomainEvent",
                "<init>",
                "()V",
            )));
        classes.push(ClassDecl::new("shop/DomainEvent").with_method(MethodDecl::constructor()));

        let model = run(
            classes,
            template(|t| {
                t.classes_named("(OrderPlaced|DomainEvent)$", |c| {
                    c.entity("event");
                });
                t.classes_named("OrderHandler$", |c| {
                    c.methods(|m| {
                        m.named("^handle$")
                            .entity("handler")
                            .instantiations_of("handler", "emits", "event");
                    });
                });
            }),
        );
        assert_single_edge(&model);
        let base = by_label(&model, "event", "DomainEvent");
        assert!(base.children(BACKTRACK).is_empty());
    }

    #[test]
    fn allocation_without_constructor_call_is_ignored() {
        let body = MethodDecl::new("handle", "()V").with_instruction(Instruction::New {
            type_name: "shop/OrderPlaced".into(),
        });
        let model = run(handler(body), instantiations());
        let handler = by_label(&model, "handler", "handle");
        assert!(handler.children("emits").is_empty());
    }

    #[test]
    fn inverse_direction_links_from_target() {
        let body = MethodDecl::new("handle", "()V")
            .with_instructions(Instruction::construct("shop/OrderPlaced", "()V"));
        let model = run(
            handler(body),
            template(|t| {
                t.classes_named("OrderPlaced$", |c| {
                    c.entity("event");
                });
                t.classes_named("OrderHandler$", |c| {
                    c.methods(|m| {
                        m.named("^handle$")
                            .entity("handler")
                            .instantiations_by("handler", "emitted_by", "event");
                    });
                });
            }),
        );
        let handler = by_label(&model, "handler", "handle");
        let event = by_label(&model, "event", "OrderPlaced");
        assert_eq!(event.children("emitted_by"), &[handler.id]);
        assert_eq!(handler.children(BACKTRACK), &[event.id]);
    }

    #[test]
    fn invocations_skip_the_callers_own_class() {
        let classes = vec![
            ClassDecl::new("shop/OrderService")
                .with_method(
                    MethodDecl::new("place", "()V")
                        .with_instruction(Instruction::invoke_virtual(
                            "shop/OrderService",
                            "validate",
                            "()V",
                        ))
                        .with_instruction(Instruction::invoke_interface(
                            "shop/OrderRepository",
                            "save",
                            "()V",
                        )),
                )
                .with_method(MethodDecl::new("validate", "()V")),
            ClassDecl::new("shop/OrderRepository").with_method(MethodDecl::new("save", "()V")),
        ];
        let model = run(
            classes,
            template(|t| {
                t.classes(|c| {
                    c.entity("component");
                });
                t.classes_named("OrderService$", |c| {
                    c.methods(|m| {
                        m.named("^place$")
                            .invocations_of("component", "calls", "component");
                    });
                });
            }),
        );
        let service = by_label(&model, "component", "OrderService");
        let repository = by_label(&model, "component", "OrderRepository");
        assert_eq!(service.children("calls"), &[repository.id]);
    }

    #[test]
    fn field_access_matches_declaring_class() {
        let classes = vec![
            ClassDecl::new("shop/Cart").with_method(
                MethodDecl::new("total", "()J").with_instruction(Instruction::field_access(
                    FieldAccessKind::Get,
                    "shop/Order",
                    "id",
                    "J",
                )),
            ),
            ClassDecl::new("shop/Order").with_field(FieldDecl::new("id", "J")),
        ];
        let model = run(
            classes,
            template(|t| {
                t.classes_named("Order$", |c| {
                    c.entity("aggregate");
                });
                t.classes_named("Cart$", |c| {
                    c.entity("service")
                        .field_accesses_of("service", "reads", "aggregate");
                });
            }),
        );
        let cart = by_label(&model, "service", "Cart");
        let order = by_label(&model, "aggregate", "Order");
        assert_eq!(cart.children("reads"), &[order.id]);
    }
}

// ============================================================================
// Synthesis, profiling, serialization
// ============================================================================

mod run_tests {
    use super::*;

    #[test]
    fn synthesized_class_behaves_like_an_input_class() {
        let mut ctx = Context::new(web_app(), AnalysisConfig::default());
        let pipeline = template(|t| {
            t.synthesized_class_entity("com/stripe/StripeClient", "external", |c| {
                c.set_property("vendor", "stripe");
            });
            t.classes(|c| {
                c.exclude(archsight::action::Filter::Synthesized)
                    .log_count("input classes");
            });
        });
        ctx.execute(&pipeline.into()).unwrap();

        let store = ctx.store();
        let stub = store.class_by_name("com/stripe/StripeClient").unwrap();
        assert!(store.is_synthesized(Element::Class(stub)));
        assert!(!store.input_classes().contains(&stub));

        let model = ctx.into_model();
        let external = by_label(&model, "external", "StripeClient");
        assert_eq!(
            external.property("vendor"),
            &[PropertyValue::Str("stripe".into())]
        );
    }

    #[test]
    fn profiling_records_every_step_with_its_scope() {
        let mut ctx = Context::new(web_app(), AnalysisConfig::default().with_profile(true));
        ctx.execute(&controllers_and_endpoints().into()).unwrap();

        let measurements = ctx.measurements();
        assert_eq!(measurements.len(), 1);
        let root = &measurements[0];
        assert_eq!(root.action, "chain");
        let steps = root.walk();
        let relate = steps
            .iter()
            .find(|m| m.action == "children:controller[endpoints]=endpoint")
            .unwrap();
        assert_eq!(relate.scope, ScopeKind::Method);
        assert_eq!(relate.input, 3);
        let classes = steps.iter().find(|m| m.action == "all_classes").unwrap();
        assert_eq!((classes.scope, classes.output), (ScopeKind::Class, 3));
    }

    #[test]
    fn model_survives_a_json_round_trip() {
        let model = run(web_app(), controllers_and_endpoints());
        let json = model.to_json().unwrap();
        let back = SystemModel::from_json(&json).unwrap();
        assert_eq!(back.records(), model.records());
        assert!(model.diff(&back).is_empty());
    }

    #[test]
    fn pipelines_serialize() {
        let pipeline: archsight::action::Action = controllers_and_endpoints().into();
        let json = serde_json::to_string(&pipeline).unwrap();
        let back: archsight::action::Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pipeline);
    }
}
