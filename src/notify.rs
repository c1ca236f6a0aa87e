//! Desktop toasts and email, both delivered through PowerShell.

use crate::{
    config::Config,
    system::{self, ps_quote},
    update::UpdateReport,
};
use anyhow::{Result, bail};

/// AppUserModelID of Windows PowerShell; toasts need a registered sender.
const TOAST_APP_ID: &str = r"{1AC14E77-02E7-4E5D-B744-2EB1AE5198B7}\WindowsPowerShell\v1.0\powershell.exe";

pub fn toast_script(title: &str, body: &str) -> String {
    format!(
        r#"[Windows.UI.Notifications.ToastNotificationManager, Windows.UI.Notifications, ContentType = WindowsRuntime] | Out-Null
$template = [Windows.UI.Notifications.ToastNotificationManager]::GetTemplateContent([Windows.UI.Notifications.ToastTemplateType]::ToastText02)
$text = $template.GetElementsByTagName('text')
$text.Item(0).AppendChild($template.CreateTextNode({title})) | Out-Null
$text.Item(1).AppendChild($template.CreateTextNode({body})) | Out-Null
$toast = [Windows.UI.Notifications.ToastNotification]::new($template)
[Windows.UI.Notifications.ToastNotificationManager]::CreateToastNotifier({app_id}).Show($toast)"#,
        title = ps_quote(title),
        body = ps_quote(body),
        app_id = ps_quote(TOAST_APP_ID),
    )
}

pub fn email_script(config: &Config, subject: &str, body: &str) -> Result<String> {
    if config.smtp_server.is_empty() {
        bail!("Email notifications are enabled but SmtpServer is not set")
    }
    if config.email_address.is_empty() {
        bail!("Email notifications are enabled but EmailAddress is not set")
    }
    let mut script = format!(
        "$params = @{{ To = {to}; From = {from}; Subject = {subject}; Body = {body}; SmtpServer = {server}; Port = {port} }}\n",
        to = ps_quote(&config.email_address),
        from = ps_quote(config.email_sender()),
        subject = ps_quote(subject),
        body = ps_quote(body),
        server = ps_quote(&config.smtp_server),
        port = config.smtp_port,
    );
    if config.smtp_use_ssl {
        script.push_str("$params.UseSsl = $true\n");
    }
    if !config.smtp_username.is_empty() {
        script.push_str(&format!(
            "$password = [Environment]::GetEnvironmentVariable({env})\n\
             if (-not $password) {{ throw 'SMTP password variable {env_name} is not set' }}\n\
             $secure = ConvertTo-SecureString $password -AsPlainText -Force\n\
             $params.Credential = New-Object System.Management.Automation.PSCredential({user}, $secure)\n",
            env = ps_quote(&config.smtp_password_env),
            env_name = config.smtp_password_env.replace('\'', "''"),
            user = ps_quote(&config.smtp_username),
        ));
    }
    script.push_str("Send-MailMessage @params -ErrorAction Stop");
    Ok(script)
}

pub fn send_toast(title: &str, body: &str) -> Result<()> {
    system::run_ps(&toast_script(title, body)).map(|_| ())
}

pub fn send_email(config: &Config, subject: &str, body: &str) -> Result<()> {
    system::run_ps(&email_script(config, subject, body)?).map(|_| ())
}

/// Sends the configured notifications for an update run. Never fails the run.
pub fn update_finished(config: &Config, computer: &str, report: &UpdateReport) {
    if !report.should_notify() {
        return;
    }
    let title = format!("Chocolatey update on {computer}");
    let summary = report.summary();

    if config.toast_notifications {
        match send_toast(&title, &summary) {
            Ok(()) => tracing::debug!("Toast notification shown"),
            Err(e) => tracing::warn!("Could not show toast notification: {e:#}"),
        }
    }

    if config.email_notifications && report.has_changes() {
        match send_email(config, &title, &report.to_string()) {
            Ok(()) => tracing::info!("Sent update report to {}", config.email_address),
            Err(e) => tracing::warn!("Could not send update report email: {e:#}"),
        }
    }
}
