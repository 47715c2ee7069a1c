use super::*;

/// Shell output up to and including the next prompt.
struct Transcript {
    text: String,
    prompt: String,
    /// First line the dialect classifies as an error.
    error_line: Option<String>,
}

impl SshSession {
    /// Connects, opens a PTY shell and waits for the first prompt.
    pub async fn open(
        target: &DeviceTarget,
        security_options: &ConnectionSecurityOptions,
    ) -> Result<SshSession, ConnectError> {
        let credentials = target.credentials();
        let device_addr = format!(
            "{}@{}:{}",
            credentials.username(),
            target.host(),
            target.port()
        );
        let matcher = target.profile().matcher()?;

        let config = Config {
            preferred: security_options.preferred(),
            inactivity_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let client = Client::connect_with_config(
            (target.host().to_string(), target.port()),
            credentials.username(),
            AuthMethod::with_password(credentials.password()),
            security_options.server_check.clone(),
            config,
        )
        .await?;
        debug!("{} TCP connection successful", device_addr);

        let mut channel = client.get_channel().await?;
        channel
            .request_pty(false, "xterm", 800, 600, 0, 0, &[])
            .await?;
        channel.request_shell(false).await?;
        debug!("{} Shell request successful", device_addr);

        let (sender_to_shell, mut receiver_from_user) = mpsc::channel::<String>(256);
        let (sender_to_user, mut receiver_from_shell) = mpsc::channel::<String>(256);

        let io_task_device_addr = device_addr.clone();
        // Dropping the guard (first-prompt failure, or the caller's connect timeout firing)
        // aborts the task and releases the channel.
        let io_task = IoTask(tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(data) = receiver_from_user.recv() => {
                        if let Err(e) = channel.data(data.as_bytes()).await {
                            debug!("{} Failed to send data to shell: {:?}", io_task_device_addr, e);
                            break;
                        }
                    },
                    Some(msg) = channel.wait() => {
                        match msg {
                            ChannelMsg::Data { ref data } => {
                                let text = String::from_utf8_lossy(data).into_owned();
                                if sender_to_user.send(text).await.is_err() {
                                    debug!("{} Shell output receiver dropped. Closing task.", io_task_device_addr);
                                    break;
                                }
                            }
                            ChannelMsg::ExitStatus { exit_status } => {
                                debug!("{} Shell exited with status code: {}", io_task_device_addr, exit_status);
                                let _ = channel.eof().await;
                                break;
                            }
                            ChannelMsg::Eof => {
                                debug!("{} Shell sent EOF.", io_task_device_addr);
                                break;
                            }
                            _ => {}
                        }
                    },
                    else => break,
                }
            }
            debug!("{} SSH I/O task ended.", io_task_device_addr);
        }));

        let banner =
            read_until_prompt(&mut receiver_from_shell, &sender_to_shell, &matcher).await;
        let prompt = match banner {
            Ok(transcript) => transcript.prompt,
            Err(err) => {
                drop(io_task);
                if let Err(e) = client.disconnect().await {
                    debug!("{} Failed to disconnect: {:?}", device_addr, e);
                }
                return Err(match err {
                    ConnectError::ChannelDisconnectError => ConnectError::InitTimeout(
                        "shell closed before the first prompt".to_string(),
                    ),
                    other => other,
                });
            }
        };
        debug!("{} Initial prompt: {:?}", device_addr, prompt);

        Ok(Self {
            client,
            io_task,
            sender: sender_to_shell,
            recv: receiver_from_shell,
            matcher,
            profile: target.profile(),
            prompt,
            device_addr,
        })
    }

    /// Checks if the underlying SSH connection is still active.
    pub fn is_connected(&self) -> bool {
        !self.client.is_closed()
    }

    /// Sends a command and waits for the next prompt.
    ///
    /// The returned text keeps the command echo and the trailing prompt. A line matching one
    /// of the dialect's error patterns turns the result into [`ConnectError::CommandRejected`].
    pub async fn write(&mut self, command: &str) -> Result<String, ConnectError> {
        // Drop anything left over from the previous exchange.
        while self.recv.try_recv().is_ok() {}

        debug!(
            "{} Sending command at {:?}: {}",
            self.device_addr, self.prompt, command
        );
        self.sender.send(format!("{command}\n")).await?;

        let transcript = read_until_prompt(&mut self.recv, &self.sender, &self.matcher).await?;
        self.prompt = transcript.prompt;

        if let Some(line) = transcript.error_line {
            return Err(ConnectError::CommandRejected {
                command: command.to_string(),
                line,
            });
        }
        Ok(transcript.text)
    }

    /// Sends `exit` if the connection is still up, then disconnects and stops the I/O task.
    ///
    /// The connection is gone when this returns, whatever the device made of `exit`.
    pub async fn close(&mut self) -> Result<(), ConnectError> {
        debug!("{} Closing SSH session...", self.device_addr);

        if self.is_connected() {
            if let Err(e) = self.sender.send("exit\n".to_string()).await {
                debug!("{} Failed to send exit command: {:?}", self.device_addr, e);
            }
            // Give the device a moment to process the exit.
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.recv.close();

        let disconnected = if self.is_connected() {
            self.client.disconnect().await
        } else {
            Ok(())
        };
        self.io_task.stop().await;

        debug!("{} SSH session closed", self.device_addr);
        disconnected?;
        Ok(())
    }
}

/// Reads shell output until a prompt shows up as an unterminated line.
///
/// Paging markers are answered with a space and dropped from the transcript; questions get
/// the answer configured by the dialect.
async fn read_until_prompt(
    recv: &mut Receiver<String>,
    sender: &Sender<String>,
    matcher: &PromptMatcher,
) -> Result<Transcript, ConnectError> {
    let mut text = String::new();
    let mut line_buffer = String::new();
    let mut error_line = None;

    loop {
        let Some(data) = recv.recv().await else {
            return Err(ConnectError::ChannelDisconnectError);
        };
        trace!("{:?}", data);
        line_buffer.push_str(&clean_output(&data));

        while let Some(newline_pos) = line_buffer.find('\n') {
            let line = line_buffer.drain(..=newline_pos).collect::<String>();
            let line = IGNORE_START_LINE.replace(&line, "");
            let trimmed_line = line.trim_end();

            match matcher.classify(trimmed_line) {
                LineKind::More => {
                    sender.send(" ".to_string()).await?;
                    continue;
                }
                LineKind::Input(answer) => {
                    trace!("Input required: '{:?}'", answer);
                    sender.send(answer).await?;
                }
                LineKind::Error => {
                    if error_line.is_none() {
                        error_line = Some(trimmed_line.to_string());
                    }
                }
                LineKind::Prompt | LineKind::Output => {}
            }
            text.push_str(trimmed_line);
            text.push('\n');
        }

        // The prompt rarely ends with a newline, so the remainder has to be checked too.
        if !line_buffer.is_empty() {
            match matcher.classify(&line_buffer) {
                LineKind::Prompt => {
                    text.push_str(&line_buffer);
                    return Ok(Transcript {
                        text,
                        prompt: line_buffer,
                        error_line,
                    });
                }
                LineKind::More => {
                    line_buffer.clear();
                    sender.send(" ".to_string()).await?;
                }
                LineKind::Input(answer) => {
                    trace!("Input required: '{:?}'", answer);
                    text.push_str(&line_buffer);
                    line_buffer.clear();
                    sender.send(answer).await?;
                }
                LineKind::Error | LineKind::Output => {}
            }
        }
    }
}

#[async_trait]
impl DeviceSession for SshSession {
    async fn save_config(&mut self) -> Result<String, ConnectError> {
        let command = self.profile.save_command();
        self.write(command).await
    }

    async fn send_command(&mut self, command: &str) -> Result<String, ConnectError> {
        self.write(command).await
    }

    async fn close(&mut self) -> Result<(), ConnectError> {
        SshSession::close(self).await
    }
}

#[async_trait]
impl SessionConnector for SshConnector {
    type Session = SshSession;

    async fn connect(&self, target: &DeviceTarget) -> Result<SshSession, ConnectError> {
        SshSession::open(target, &self.security).await
    }
}
