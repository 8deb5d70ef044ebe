// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::pin::Pin;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Event, Pod};
use kube::{
	api::{Api, AttachParams, DeleteParams, LogParams, PostParams},
	config::KubeConfigOptions,
	runtime::{watcher, WatchStreamExt},
	Client, Config,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tracing::{debug, instrument, warn};

use crate::client::K8sClient;
use crate::error::K8sError;
use crate::types::{AttachOptions, AttachedProcess, EventWatch, LogStream, PodWatch, PortTunnel};

/// Production K8s client implementation using the kube crate.
pub struct KubeClient {
	client: Client,
	default_namespace: String,
}

impl KubeClient {
	/// Create a new KubeClient that auto-discovers cluster configuration.
	///
	/// Without an explicit context this will attempt to load config from:
	/// 1. In-cluster service account (when running in K8s)
	/// 2. KUBECONFIG environment variable
	/// 3. ~/.kube/config
	///
	/// With a context, only the kubeconfig file is consulted.
	pub async fn new(context: Option<&str>) -> Result<Self, K8sError> {
		let config = match context {
			Some(context) => {
				let options = KubeConfigOptions {
					context: Some(context.to_string()),
					..Default::default()
				};
				Config::from_kubeconfig(&options)
					.await
					.map_err(|e| K8sError::ConfigError {
						message: e.to_string(),
					})?
			}
			None => Config::infer().await.map_err(|e| K8sError::ConfigError {
				message: e.to_string(),
			})?,
		};

		let default_namespace = config.default_namespace.clone();
		let client = Client::try_from(config)?;
		debug!(namespace = %default_namespace, "K8s client initialized");
		Ok(Self {
			client,
			default_namespace,
		})
	}

	/// Namespace selected by the resolved kubeconfig or service account.
	pub fn default_namespace(&self) -> &str {
		&self.default_namespace
	}

	fn pods(&self, namespace: &str) -> Api<Pod> {
		Api::namespaced(self.client.clone(), namespace)
	}
}

fn attach_params(opts: &AttachOptions) -> AttachParams {
	AttachParams {
		container: Some(opts.container.clone()),
		stdin: opts.stdin,
		stdout: opts.stdout,
		// The API server rejects stderr together with a TTY.
		stderr: opts.stderr && !opts.tty,
		tty: opts.tty,
		..Default::default()
	}
}

fn into_process(mut attached: kube::api::AttachedProcess) -> AttachedProcess {
	let stdin = attached
		.stdin()
		.map(|w| Box::pin(w) as Pin<Box<dyn AsyncWrite + Send>>);
	let stdout = attached
		.stdout()
		.map(|r| Box::pin(r) as Pin<Box<dyn AsyncRead + Send>>);
	let stderr = attached
		.stderr()
		.map(|r| Box::pin(r) as Pin<Box<dyn AsyncRead + Send>>);
	let resize = attached.terminal_size();
	let status = attached.take_status();

	AttachedProcess {
		stdin,
		stdout,
		stderr,
		resize,
		status: Box::pin(async move {
			let status = match status {
				Some(status) => status.await,
				None => None,
			};
			if let Err(e) = attached.join().await {
				debug!(error = %e, "attached process finished with error");
			}
			status
		}),
	}
}

fn attach_error(name: &str, err: kube::Error) -> K8sError {
	match err {
		kube::Error::Api(ref resp) if resp.code == 404 => K8sError::PodNotFound { name: name.into() },
		_ => K8sError::AttachError {
			message: err.to_string(),
		},
	}
}

#[async_trait]
impl K8sClient for KubeClient {
	async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod, K8sError> {
		let pod = self.pods(namespace).create(&PostParams::default(), &pod).await?;
		Ok(pod)
	}

	async fn delete_pod(
		&self,
		name: &str,
		namespace: &str,
		grace_period_seconds: u32,
	) -> Result<(), K8sError> {
		let dp = DeleteParams {
			grace_period_seconds: Some(grace_period_seconds),
			..Default::default()
		};
		match self.pods(namespace).delete(name, &dp).await {
			Ok(_) => Ok(()),
			Err(kube::Error::Api(err)) if err.code == 404 => {
				Err(K8sError::PodNotFound { name: name.into() })
			}
			Err(e) => Err(e.into()),
		}
	}

	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError> {
		match self.pods(namespace).get(name).await {
			Ok(pod) => Ok(pod),
			Err(kube::Error::Api(err)) if err.code == 404 => {
				Err(K8sError::PodNotFound { name: name.into() })
			}
			Err(e) => Err(e.into()),
		}
	}

	#[instrument(skip(self))]
	async fn watch_pod(&self, name: &str, namespace: &str) -> Result<PodWatch, K8sError> {
		let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
		let stream = watcher(self.pods(namespace), config)
			.applied_objects()
			.map(|item| item.map_err(K8sError::from));
		Ok(Box::pin(stream))
	}

	#[instrument(skip(self))]
	async fn watch_events(&self, namespace: &str) -> Result<EventWatch, K8sError> {
		let events: Api<Event> = Api::namespaced(self.client.clone(), namespace);
		let stream = watcher(events, watcher::Config::default())
			.applied_objects()
			.map(|item| item.map_err(K8sError::from));
		Ok(Box::pin(stream))
	}

	async fn stream_logs(
		&self,
		name: &str,
		namespace: &str,
		container: &str,
	) -> Result<LogStream, K8sError> {
		let lp = LogParams {
			container: Some(container.to_string()),
			follow: true,
			..Default::default()
		};

		let stream = self
			.pods(namespace)
			.log_stream(name, &lp)
			.await
			.map_err(|e| match e {
				kube::Error::Api(ref err) if err.code == 404 => {
					K8sError::PodNotFound { name: name.into() }
				}
				_ => K8sError::StreamError {
					message: e.to_string(),
				},
			})?;

		let compat_stream = stream.compat();
		let bytes_stream = tokio_util::io::ReaderStream::new(compat_stream);
		Ok(Box::pin(bytes_stream))
	}

	async fn attach(
		&self,
		name: &str,
		namespace: &str,
		opts: &AttachOptions,
	) -> Result<AttachedProcess, K8sError> {
		let attached = self
			.pods(namespace)
			.attach(name, &attach_params(opts))
			.await
			.map_err(|e| attach_error(name, e))?;
		Ok(into_process(attached))
	}

	async fn exec(
		&self,
		name: &str,
		namespace: &str,
		command: &[String],
		opts: &AttachOptions,
	) -> Result<AttachedProcess, K8sError> {
		let attached = self
			.pods(namespace)
			.exec(name, command.to_vec(), &attach_params(opts))
			.await
			.map_err(|e| attach_error(name, e))?;
		Ok(into_process(attached))
	}

	async fn port_forward(
		&self,
		name: &str,
		namespace: &str,
		port: u16,
	) -> Result<PortTunnel, K8sError> {
		let mut forwarder = self
			.pods(namespace)
			.portforward(name, &[port])
			.await
			.map_err(|e| match e {
				kube::Error::Api(ref err) if err.code == 404 => {
					K8sError::PodNotFound { name: name.into() }
				}
				_ => K8sError::PortForwardError {
					port,
					message: e.to_string(),
				},
			})?;

		let io = forwarder
			.take_stream(port)
			.ok_or_else(|| K8sError::PortForwardError {
				port,
				message: "stream not available".into(),
			})?;

		if let Some(errors) = forwarder.take_error(port) {
			tokio::spawn(async move {
				if let Some(message) = errors.await {
					warn!(port, %message, "pod reported port forward error");
				}
			});
		}
		tokio::spawn(async move {
			if let Err(e) = forwarder.join().await {
				debug!(port, error = %e, "port forwarder finished with error");
			}
		});

		Ok(PortTunnel {
			port,
			io: Box::new(io),
		})
	}
}
