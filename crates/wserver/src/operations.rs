//! RPC method registry.
//!
//! Each method is a declared parameter list plus a handler. Write methods are
//! composed once at startup: a [`LocalWrite`] against GDB, wrapped in a
//! [`Propagate`] layer for the methods whose records core nodes also need.

use crate::config::WServerConfig;
use crate::photos::PhotoStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wserver_db::{
    Gdb, NewAct, NewAuto, NewCompany, NewNote, NewOperator, NewRfid, NewTrashCat, NewTrashType,
};
use wserver_fanout::{
    collect, CompositionError, Dispatcher, FanoutMode, LocalWrite, NamedArgs, NodeResolver,
    ParamSchema, Propagate, WriteStage, ZmqCoreConnector,
};
use wserver_protocol::{RecordId, RpcRequest, RpcResponse, WriteOutcome, WriteReport};

/// Methods whose committed rows are pushed to core nodes, by operation name.
const PROPAGATION: &[(&str, &str)] = &[
    ("set_auto", "auto"),
    ("set_operator", "operator"),
    ("set_trash_cat", "trash_cat"),
    ("set_trash_type", "trash_type"),
    ("set_company", "company"),
];

/// Photo upload for an act.
#[derive(Debug, Deserialize)]
struct PhotoUpload {
    record: RecordId,
    photo_obj: String,
    #[serde(default)]
    photo_type: Option<i64>,
}

/// Single-key id lookups.
#[derive(Debug, Clone, Copy)]
enum Lookup {
    Auto,
    Company,
    Rfid,
}

impl Lookup {
    fn key(&self) -> &'static str {
        match self {
            Lookup::Auto => "car_number",
            Lookup::Company => "name",
            Lookup::Rfid => "rfid",
        }
    }
}

enum Handler {
    Write(Box<dyn WriteStage>),
    Lookup(Lookup),
    Ping,
}

struct Method {
    schema: ParamSchema,
    handler: Handler,
}

/// Every method the RPC server answers.
pub struct Registry {
    gdb: Gdb,
    methods: BTreeMap<&'static str, Method>,
}

/// Deserialize collected arguments into a typed write input.
fn typed<T: DeserializeOwned>(args: NamedArgs) -> Result<T, String> {
    serde_json::from_value(Value::Object(args.into_iter().collect()))
        .map_err(|e| format!("Invalid arguments: {}", e))
}

/// Local write stage: typed input in, one GDB write out.
fn local<T, F, Fut>(gdb: &Gdb, write: F) -> LocalWrite
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(Gdb, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = WriteOutcome> + Send + 'static,
{
    let gdb = gdb.clone();
    LocalWrite::new(move |args| {
        let pending = typed::<T>(args).map(|input| write(gdb.clone(), input));
        async move {
            match pending {
                Ok(write) => write.await,
                Err(cause) => {
                    warn!(%cause, "Rejecting write");
                    WriteOutcome::Failure(cause)
                }
            }
        }
    })
}

/// Fills `rfid_id` from the `rfid` tag before the write runs, so the row and
/// the propagated call carry the same mark id.
struct ResolveRfidTag {
    gdb: Gdb,
    inner: Box<dyn WriteStage>,
}

#[async_trait]
impl WriteStage for ResolveRfidTag {
    async fn run(&self, args: &NamedArgs) -> WriteReport {
        let tag = match (args.get("rfid_id"), args.get("rfid")) {
            (None | Some(Value::Null), Some(Value::String(tag))) => tag,
            _ => return self.inner.run(args).await,
        };

        match self.gdb.get_rfid_id(tag).await {
            Ok(Some(id)) => {
                debug!(rfid = %tag, %id, "Resolved RFID tag");
                let mut resolved = args.clone();
                resolved.insert("rfid_id".to_string(), Value::from(id.get()));
                self.inner.run(&resolved).await
            }
            Ok(None) => self.inner.run(args).await,
            Err(e) => {
                warn!(rfid = %tag, error = %e, "RFID lookup failed; writing auto without mark");
                self.inner.run(args).await
            }
        }
    }
}

impl Registry {
    /// Compose every method. Fails if a propagation layer is wired to an
    /// unknown operation or to a method that does not declare what it reads.
    pub fn new(
        gdb: Gdb,
        photos: PhotoStore,
        dispatcher: Arc<Dispatcher>,
        mode: FanoutMode,
    ) -> Result<Self, CompositionError> {
        let mut registry = Self {
            gdb: gdb.clone(),
            methods: BTreeMap::new(),
        };

        registry.write(
            "set_act",
            ParamSchema::new()
                .required("auto_id")
                .required("gross")
                .required("tare")
                .required("cargo")
                .required("time_in")
                .required("time_out")
                .required("carrier_id")
                .required("trash_cat_id")
                .required("trash_type_id")
                .required("polygon_id")
                .required("operator")
                .required("ex_id"),
            local(&gdb, |gdb, act: NewAct| async move { gdb.set_act(&act).await }),
        );
        registry.write(
            "set_auto",
            ParamSchema::new()
                .required("car_number")
                .required("polygon")
                .required("id_type")
                .with_default("rg_weight", 0)
                .with_default("model", 0)
                .with_default("rfid", Value::Null)
                .with_default("rfid_id", Value::Null),
            local(&gdb, |gdb, auto: NewAuto| async move { gdb.set_auto(&auto).await }),
        );
        registry.write(
            "set_photos",
            ParamSchema::new()
                .required("record")
                .required("photo_obj")
                .required("photo_type"),
            local(&gdb, move |gdb, upload: PhotoUpload| {
                let photos = photos.clone();
                async move {
                    match photos.save(upload.record, &upload.photo_obj).await {
                        Ok(path) => {
                            let outcome = gdb
                                .add_photo_record(
                                    upload.record,
                                    &path.to_string_lossy(),
                                    upload.photo_type,
                                )
                                .await;
                            if !outcome.is_success() {
                                photos.discard(&path).await;
                            }
                            outcome
                        }
                        Err(e) => {
                            warn!(record = %upload.record, error = %e, "Photo not stored");
                            WriteOutcome::Failure(e.to_string())
                        }
                    }
                }
            }),
        );
        registry.write(
            "set_notes",
            ParamSchema::new()
                .required("record")
                .required("note")
                .required("note_type"),
            local(&gdb, |gdb, note: NewNote| async move {
                gdb.add_operator_notes(&note).await
            }),
        );
        registry.write(
            "set_company",
            ParamSchema::new()
                .required("name")
                .required("inn")
                .required("kpp")
                .required("polygon")
                .with_default("status", true)
                .with_default("ex_id", Value::Null)
                .with_default("active", true),
            local(&gdb, |gdb, company: NewCompany| async move {
                gdb.set_company(&company).await
            }),
        );
        registry.write(
            "set_operator",
            ParamSchema::new()
                .required("full_name")
                .required("login")
                .required("password")
                .required("polygon")
                .with_default("active", true),
            local(&gdb, |gdb, operator: NewOperator| async move {
                gdb.set_operator(&operator).await
            }),
        );
        registry.write(
            "set_trash_cat",
            ParamSchema::new()
                .required("name")
                .required("polygon")
                .with_default("active", true),
            local(&gdb, |gdb, cat: NewTrashCat| async move {
                gdb.set_trash_cat(&cat).await
            }),
        );
        registry.write(
            "set_trash_type",
            ParamSchema::new()
                .required("name")
                .required("polygon")
                .with_default("category", Value::Null)
                .with_default("active", true),
            local(&gdb, |gdb, trash_type: NewTrashType| async move {
                gdb.set_trash_type(&trash_type).await
            }),
        );
        registry.write(
            "set_rfid",
            ParamSchema::new()
                .required("rfid")
                .with_default("rfid_type", Value::Null)
                .with_default("owner", Value::Null),
            local(&gdb, |gdb, mark: NewRfid| async move { gdb.add_rfid(&mark).await }),
        );

        for lookup in [Lookup::Auto, Lookup::Company, Lookup::Rfid] {
            let name = match lookup {
                Lookup::Auto => "get_auto_id",
                Lookup::Company => "get_company_id",
                Lookup::Rfid => "get_rfid_id",
            };
            registry.methods.insert(
                name,
                Method {
                    schema: ParamSchema::new().required(lookup.key()),
                    handler: Handler::Lookup(lookup),
                },
            );
        }
        registry.methods.insert(
            "ping",
            Method {
                schema: ParamSchema::new(),
                handler: Handler::Ping,
            },
        );

        for &(method, operation) in PROPAGATION {
            registry.propagate(method, operation, dispatcher.clone(), mode)?;
        }
        registry.wrap("set_auto", |inner| -> Box<dyn WriteStage> {
            Box::new(ResolveRfidTag {
                gdb: gdb.clone(),
                inner,
            })
        });

        info!(methods = registry.methods.len(), "RPC methods registered");
        Ok(registry)
    }

    /// Compose the registry the configured way: ZMQ core client, GDB directory.
    pub fn from_config(config: &WServerConfig, gdb: Gdb) -> Result<Self, CompositionError> {
        let connector = ZmqCoreConnector {
            port: config.core.port,
            connect_timeout: config.core.connect_timeout(),
            request_timeout: config.core.request_timeout(),
        };
        let dispatcher = Arc::new(Dispatcher::new(
            NodeResolver::new(Arc::new(gdb.clone())),
            Arc::new(connector),
            config.core.auth(),
        ));
        let photos = PhotoStore::new(&config.photos_dir);

        Self::new(gdb, photos, dispatcher, config.fanout_mode)
    }

    fn write(&mut self, name: &'static str, schema: ParamSchema, stage: impl WriteStage + 'static) {
        self.methods.insert(
            name,
            Method {
                schema,
                handler: Handler::Write(Box::new(stage)),
            },
        );
    }

    /// Put an outer stage around an already registered write method.
    fn wrap<F>(&mut self, name: &'static str, outer: F)
    where
        F: FnOnce(Box<dyn WriteStage>) -> Box<dyn WriteStage>,
    {
        let Some(method) = self.methods.remove(name) else {
            return;
        };
        let handler = match method.handler {
            Handler::Write(stage) => Handler::Write(outer(stage)),
            other => other,
        };
        self.methods.insert(
            name,
            Method {
                schema: method.schema,
                handler,
            },
        );
    }

    /// Wrap an already registered write method in a propagation layer.
    fn propagate(
        &mut self,
        name: &'static str,
        operation: &str,
        dispatcher: Arc<Dispatcher>,
        mode: FanoutMode,
    ) -> Result<(), CompositionError> {
        let Some(method) = self.methods.remove(name) else {
            return Ok(());
        };
        let handler = match method.handler {
            Handler::Write(stage) => {
                let layer = Propagate::named(operation, &method.schema, dispatcher, mode)?;
                Handler::Write(Box::new(layer.layer(stage)))
            }
            other => other,
        };
        self.methods.insert(
            name,
            Method {
                schema: method.schema,
                handler,
            },
        );
        Ok(())
    }

    pub fn method_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.keys().copied()
    }

    /// Answer one request. Never fails: every problem becomes `status: false`.
    pub async fn handle(&self, request: RpcRequest) -> RpcResponse {
        let Some(method) = self.methods.get(request.method.as_str()) else {
            warn!(method = %request.method, "Unknown method");
            return RpcResponse::error(format!("Unknown method: {}", request.method));
        };

        let args = match collect(&method.schema, &request.positional, &request.args) {
            Ok(args) => args,
            Err(e) => {
                warn!(method = %request.method, error = %e, "Rejected arguments");
                return RpcResponse::error(e.to_string());
            }
        };

        debug!(method = %request.method, "Handling request");
        match &method.handler {
            Handler::Write(stage) => RpcResponse::from_report(stage.run(&args).await),
            Handler::Lookup(lookup) => self.lookup(*lookup, &args).await,
            Handler::Ping => RpcResponse::ok("pong"),
        }
    }

    async fn lookup(&self, lookup: Lookup, args: &NamedArgs) -> RpcResponse {
        let key = match args.get(lookup.key()) {
            Some(Value::String(key)) => key.as_str(),
            _ => return RpcResponse::error(format!("'{}' must be a string", lookup.key())),
        };

        let found = match lookup {
            Lookup::Auto => self.gdb.get_auto_id(key).await,
            Lookup::Company => self.gdb.get_company_id(key).await,
            Lookup::Rfid => self.gdb.get_rfid_id(key).await,
        };

        match found {
            Ok(Some(id)) => RpcResponse::ok(id.get()),
            Ok(None) => RpcResponse::ok(Value::Null),
            Err(e) => RpcResponse::error(e.to_string()),
        }
    }
}
