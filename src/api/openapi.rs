//! Pesto - OpenAPI document
//!
//! Routes are described by a static table; `document` renders it. Nothing is
//! registered at runtime, so the same table always yields the same document.

use std::collections::BTreeMap;

use utoipa::openapi::path::{
    Operation, OperationBuilder, Parameter, ParameterBuilder, ParameterIn, PathItemBuilder, PathItemType,
};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::schema::{KnownFormat, SchemaFormat};
use utoipa::openapi::{
    ArrayBuilder, Components, ComponentsBuilder, Content, ContentBuilder, InfoBuilder, ObjectBuilder, OpenApi,
    OpenApiBuilder, PathsBuilder, Ref, RefOr, Required, Response, ResponseBuilder, Schema, SchemaType,
    ServerBuilder,
};

pub const TITLE: &str = "Pesto Clipboard API";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const TAG: &str = "clipboard-items";
const JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    fn item_type(self) -> PathItemType {
        match self {
            Method::Get => PathItemType::Get,
            Method::Post => PathItemType::Post,
            Method::Put => PathItemType::Put,
            Method::Delete => PathItemType::Delete,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// Payload shapes used by the routes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Body {
    Item,
    ItemList,
    ItemInput,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    String,
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub location: ParamLocation,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct RouteSpec {
    pub method: Method,
    /// Path template, parameters in braces
    pub path: &'static str,
    pub operation_id: &'static str,
    pub summary: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub request: Option<Body>,
    pub status: u16,
    pub response: Option<Body>,
    /// Whether the route can answer 404
    pub not_found: bool,
}

const ID_PARAM: ParamSpec = ParamSpec {
    name: "id",
    location: ParamLocation::Path,
    kind: ParamKind::Integer,
    required: true,
    description: "Clipboard item identifier",
};

/// Every route the service serves
pub const CLIPBOARD_ROUTES: &[RouteSpec] = &[
    RouteSpec {
        method: Method::Post,
        path: "/clipboard-items",
        operation_id: "createClipboardItem",
        summary: "Create a clipboard item",
        description: "Stores a new item and makes it the current one, demoting the previous current item",
        params: &[],
        request: Some(Body::ItemInput),
        status: 201,
        response: Some(Body::Item),
        not_found: false,
    },
    RouteSpec {
        method: Method::Get,
        path: "/clipboard-items",
        operation_id: "listClipboardItems",
        summary: "Get all clipboard items",
        description: "Retrieves all clipboard items, newest first",
        params: &[],
        request: None,
        status: 200,
        response: Some(Body::ItemList),
        not_found: false,
    },
    RouteSpec {
        method: Method::Get,
        path: "/clipboard-items/current",
        operation_id: "getCurrentClipboardItem",
        summary: "Get the current clipboard item",
        description: "Retrieves the most recently copied clipboard item",
        params: &[],
        request: None,
        status: 200,
        response: Some(Body::Item),
        not_found: true,
    },
    RouteSpec {
        method: Method::Get,
        path: "/clipboard-items/search",
        operation_id: "searchClipboardItems",
        summary: "Search clipboard items",
        description: "Retrieves items whose content contains the query text, newest first",
        params: &[
            ParamSpec {
                name: "q",
                location: ParamLocation::Query,
                kind: ParamKind::String,
                required: false,
                description: "Text to look for; empty lists the newest items",
            },
            ParamSpec {
                name: "limit",
                location: ParamLocation::Query,
                kind: ParamKind::Integer,
                required: false,
                description: "Maximum number of results (default 50)",
            },
        ],
        request: None,
        status: 200,
        response: Some(Body::ItemList),
        not_found: false,
    },
    RouteSpec {
        method: Method::Get,
        path: "/clipboard-items/content/{content_type}",
        operation_id: "listClipboardItemsByContentType",
        summary: "Get clipboard items by content type",
        description: "Retrieves all clipboard items with exactly this content type",
        params: &[ParamSpec {
            name: "content_type",
            location: ParamLocation::Path,
            kind: ParamKind::String,
            required: true,
            description: "Content type, matched case-sensitively",
        }],
        request: None,
        status: 200,
        response: Some(Body::ItemList),
        not_found: false,
    },
    RouteSpec {
        method: Method::Get,
        path: "/clipboard-items/{id}",
        operation_id: "getClipboardItem",
        summary: "Get a clipboard item by ID",
        description: "Retrieves a specific clipboard item by its ID",
        params: &[ID_PARAM],
        request: None,
        status: 200,
        response: Some(Body::Item),
        not_found: true,
    },
    RouteSpec {
        method: Method::Put,
        path: "/clipboard-items/{id}",
        operation_id: "editClipboardItem",
        summary: "Edit a clipboard item",
        description: "Replaces content and content type; the current flag is left alone",
        params: &[ID_PARAM],
        request: Some(Body::ItemInput),
        status: 200,
        response: Some(Body::Item),
        not_found: true,
    },
    RouteSpec {
        method: Method::Delete,
        path: "/clipboard-items/{id}",
        operation_id: "deleteClipboardItem",
        summary: "Delete a clipboard item",
        description: "Deletes a specific clipboard item by its ID; no other item becomes current",
        params: &[ID_PARAM],
        request: None,
        status: 200,
        response: Some(Body::Deleted),
        not_found: false,
    },
];

fn field(kind: SchemaType, format: Option<KnownFormat>, description: &str) -> RefOr<Schema> {
    let mut builder = ObjectBuilder::new().schema_type(kind).description(Some(description));
    if let Some(format) = format {
        builder = builder.format(Some(SchemaFormat::KnownFormat(format)));
    }
    RefOr::T(Schema::Object(builder.build()))
}

fn schema_ref(name: &str) -> RefOr<Schema> {
    RefOr::Ref(Ref::from_schema_name(name))
}

fn body_schema(body: Body) -> RefOr<Schema> {
    match body {
        Body::Item => schema_ref("ClipboardItem"),
        Body::ItemList => RefOr::T(Schema::Array(
            ArrayBuilder::new().items(schema_ref("ClipboardItem")).build(),
        )),
        Body::ItemInput => schema_ref("ClipboardItemInput"),
        Body::Deleted => schema_ref("DeletedItem"),
    }
}

fn json_content(schema: RefOr<Schema>) -> Content {
    ContentBuilder::new().schema(schema).build()
}

fn components() -> Components {
    let item = ObjectBuilder::new()
        .property("id", field(SchemaType::Integer, Some(KnownFormat::Int64), "Store-assigned identifier"))
        .property("content", field(SchemaType::String, None, "Text payload"))
        .property("content_type", field(SchemaType::String, None, "Free-form classification tag"))
        .property("is_current", field(SchemaType::Boolean, None, "Whether this is the current item"))
        .property("created_at", field(SchemaType::String, Some(KnownFormat::DateTime), "Creation time"))
        .property("updated_at", field(SchemaType::String, Some(KnownFormat::DateTime), "Last modification time"))
        .required("id")
        .required("content")
        .required("content_type")
        .required("is_current")
        .required("created_at")
        .required("updated_at")
        .build();

    let input = ObjectBuilder::new()
        .property("content", field(SchemaType::String, None, "Text payload, non-empty"))
        .property("content_type", field(SchemaType::String, None, "Classification tag, non-empty"))
        .required("content")
        .required("content_type")
        .build();

    let deleted = ObjectBuilder::new()
        .property("id", field(SchemaType::Integer, Some(KnownFormat::Int64), "Deleted item identifier"))
        .property("deleted", field(SchemaType::Boolean, None, "Always true"))
        .required("id")
        .required("deleted")
        .build();

    let error = ObjectBuilder::new()
        .property("error", field(SchemaType::String, None, "Human-readable message"))
        .required("error")
        .build();

    ComponentsBuilder::new()
        .schema("ClipboardItem", RefOr::T(Schema::Object(item)))
        .schema("ClipboardItemInput", RefOr::T(Schema::Object(input)))
        .schema("DeletedItem", RefOr::T(Schema::Object(deleted)))
        .schema("Error", RefOr::T(Schema::Object(error)))
        .build()
}

fn parameter(spec: &ParamSpec) -> Parameter {
    let kind = match spec.kind {
        ParamKind::Integer => field(SchemaType::Integer, Some(KnownFormat::Int64), spec.description),
        ParamKind::String => field(SchemaType::String, None, spec.description),
    };
    ParameterBuilder::new()
        .name(spec.name)
        .parameter_in(match spec.location {
            ParamLocation::Path => ParameterIn::Path,
            ParamLocation::Query => ParameterIn::Query,
        })
        .required(if spec.required { Required::True } else { Required::False })
        .description(Some(spec.description))
        .schema(Some(kind))
        .build()
}

fn error_response(description: &str) -> RefOr<Response> {
    RefOr::T(
        ResponseBuilder::new()
            .description(description)
            .content(JSON, json_content(schema_ref("Error")))
            .build(),
    )
}

fn operation(route: &RouteSpec) -> Operation {
    let mut builder = OperationBuilder::new()
        .operation_id(Some(route.operation_id))
        .summary(Some(route.summary))
        .description(Some(route.description))
        .tag(TAG);

    for param in route.params {
        builder = builder.parameter(parameter(param));
    }

    if let Some(body) = route.request {
        builder = builder.request_body(Some(
            RequestBodyBuilder::new()
                .content(JSON, json_content(body_schema(body)))
                .required(Some(Required::True))
                .build(),
        ));
    }

    let mut success = ResponseBuilder::new().description(route.summary);
    if let Some(body) = route.response {
        success = success.content(JSON, json_content(body_schema(body)));
    }
    builder = builder.response(route.status.to_string(), RefOr::T(success.build()));

    if !route.params.is_empty() || route.request.is_some() {
        builder = builder.response("400", error_response("Invalid request"));
    }
    if route.not_found {
        builder = builder.response("404", error_response("Not found"));
    }
    builder
        .response("500", error_response("Storage failure"))
        .response("504", error_response("Request deadline exceeded"))
        .build()
}

/// Render the OpenAPI document for `routes`
pub fn document(routes: &[RouteSpec], server_url: &str) -> OpenApi {
    // Group operations by path; BTreeMap keeps output order stable
    let mut by_path: BTreeMap<&str, Vec<&RouteSpec>> = BTreeMap::new();
    for route in routes {
        by_path.entry(route.path).or_default().push(route);
    }

    let mut paths = PathsBuilder::new();
    for (path, routes) in by_path {
        let item = routes
            .into_iter()
            .fold(PathItemBuilder::new(), |item, route| {
                item.operation(route.method.item_type(), operation(route))
            })
            .build();
        paths = paths.path(path, item);
    }

    OpenApiBuilder::new()
        .info(
            InfoBuilder::new()
                .title(TITLE)
                .version(VERSION)
                .description(Some("Clipboard history with a single current item"))
                .build(),
        )
        .servers(Some(vec![ServerBuilder::new()
            .url(server_url)
            .description(Some("Configured listen address"))
            .build()]))
        .paths(paths.build())
        .components(Some(components()))
        .build()
}
